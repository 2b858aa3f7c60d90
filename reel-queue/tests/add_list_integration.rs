//! Integration tests for reel-queue add and list

mod common;

use common::{setup_test_env, OFFLINE_API_URL};
use libreelcast::PostStatus;
use predicates::prelude::*;

#[tokio::test]
async fn test_add_schedules_post() {
    let env = setup_test_env(OFFLINE_API_URL).await;
    let video = env.video("sunset.mp4");

    let output = env
        .cmd()
        .arg("add")
        .arg("Sunset timelapse")
        .arg("--media")
        .arg(&video)
        .arg("--at")
        .arg("2h")
        .output()
        .unwrap();
    assert!(output.status.success());

    let post_id = String::from_utf8(output.stdout).unwrap().trim().to_string();
    let post = env.stored(&post_id).await.unwrap();

    assert_eq!(post.status, PostStatus::Scheduled);
    assert_eq!(post.caption, "Sunset timelapse");
    assert_eq!(post.reel_path(), Some(video.as_str()));

    let expected = chrono::Utc::now().timestamp() + 7200;
    let scheduled_for = post.scheduled_for.unwrap();
    assert!((scheduled_for - expected).abs() < 60);
}

#[tokio::test]
async fn test_add_rejects_missing_video() {
    let env = setup_test_env(OFFLINE_API_URL).await;

    env.cmd()
        .arg("add")
        .arg("Sunset")
        .arg("--media")
        .arg("/nonexistent/video.mp4")
        .arg("--at")
        .arg("2h")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Video file not found"));

    assert_eq!(env.db().await.stats().await.unwrap().total, 0);
}

#[tokio::test]
async fn test_add_rejects_bad_time() {
    let env = setup_test_env(OFFLINE_API_URL).await;
    let video = env.video("a.mp4");

    env.cmd()
        .arg("add")
        .arg("Sunset")
        .arg("--media")
        .arg(&video)
        .arg("--at")
        .arg("not a time at all")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Could not parse schedule string"));
}

#[tokio::test]
async fn test_add_rejects_empty_caption() {
    let env = setup_test_env(OFFLINE_API_URL).await;
    let video = env.video("a.mp4");

    env.cmd()
        .arg("add")
        .arg("   ")
        .arg("--media")
        .arg(&video)
        .arg("--at")
        .arg("2h")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Caption cannot be empty"));
}

#[tokio::test]
async fn test_list_empty_queue() {
    let env = setup_test_env(OFFLINE_API_URL).await;

    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[tokio::test]
async fn test_list_shows_only_scheduled_by_default() {
    let env = setup_test_env(OFFLINE_API_URL).await;
    env.insert_post("upcoming", PostStatus::Scheduled, 7800).await;
    env.insert_post("done", PostStatus::Published, -7200).await;

    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("upcoming | scheduled | Caption upcoming | in 2 hours"))
        .stdout(predicate::str::contains("done").not());
}

#[tokio::test]
async fn test_list_json_format() {
    let env = setup_test_env(OFFLINE_API_URL).await;
    env.insert_post("later", PostStatus::Scheduled, 86_400).await;
    env.insert_post("sooner", PostStatus::Scheduled, 3600).await;

    let output = env
        .cmd()
        .arg("list")
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let posts = json.as_array().unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0]["id"], "sooner");
    assert_eq!(posts[0]["status"], "scheduled");
    assert_eq!(posts[1]["id"], "later");
    assert!(posts[0]["remote_url"].is_null());
}

#[tokio::test]
async fn test_list_by_status() {
    let env = setup_test_env(OFFLINE_API_URL).await;
    env.insert_post("upcoming", PostStatus::Scheduled, 7200).await;
    env.insert_post("broken", PostStatus::Failed, -7200).await;

    env.cmd()
        .arg("list")
        .arg("--status")
        .arg("failed")
        .assert()
        .success()
        .stdout(predicate::str::contains("broken | failed"))
        .stdout(predicate::str::contains("upcoming").not());

    env.cmd()
        .arg("list")
        .arg("--status")
        .arg("all")
        .assert()
        .success()
        .stdout(predicate::str::contains("broken"))
        .stdout(predicate::str::contains("upcoming"));
}

#[tokio::test]
async fn test_list_invalid_arguments() {
    let env = setup_test_env(OFFLINE_API_URL).await;

    env.cmd()
        .arg("list")
        .arg("--format")
        .arg("yaml")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid format 'yaml'"));

    env.cmd()
        .arg("list")
        .arg("--status")
        .arg("drafted")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid post status"));
}
