//! Shared setup for reel-queue integration tests

#![allow(dead_code)]

use assert_cmd::Command;
use libreelcast::{Database, Media, Post, PostRepository, PostStatus};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Unroutable address for tests that never reach the backends
pub const OFFLINE_API_URL: &str = "http://127.0.0.1:9";

pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config_path: String,
    pub db_path: String,
}

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &Path) -> String {
    path.display().to_string().replace('\\', "\\\\")
}

/// Create config, token file and database; both backends use `api_url`
pub async fn setup_test_env(api_url: &str) -> TestEnv {
    let temp_dir = TempDir::new().unwrap();

    let config_dir = temp_dir.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let data_dir = temp_dir.path().join("data");
    fs::create_dir_all(&data_dir).unwrap();

    let config_path = config_dir.join("config.toml");
    let db_path = data_dir.join("posts.db");
    let token_path = config_dir.join("instagram.token");
    fs::write(&token_path, "test-token").unwrap();

    let config_content = format!(
        r#"
[database]
path = "{}"

[scheduler]
poll_interval_secs = 0
max_poll_attempts = 2

[cloudinary]
cloud_name = "demo"
api_key = "123"
api_secret = "shh"
api_url = "{}"

[instagram]
account_id = "1784"
access_token_file = "{}"
graph_api_url = "{}"
"#,
        escape_path_for_toml(&db_path),
        api_url,
        escape_path_for_toml(&token_path),
        api_url
    );
    fs::write(&config_path, config_content).unwrap();

    let _db = Database::new(db_path.to_str().unwrap()).await.unwrap();

    TestEnv {
        config_path: config_path.to_string_lossy().to_string(),
        db_path: db_path.to_string_lossy().to_string(),
        temp_dir,
    }
}

/// Create a config with only a `[database]` section, and the database
pub async fn setup_database_only_env() -> TestEnv {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("posts.db");

    fs::write(
        &config_path,
        format!("[database]\npath = \"{}\"\n", escape_path_for_toml(&db_path)),
    )
    .unwrap();

    let _db = Database::new(db_path.to_str().unwrap()).await.unwrap();

    TestEnv {
        config_path: config_path.to_string_lossy().to_string(),
        db_path: db_path.to_string_lossy().to_string(),
        temp_dir,
    }
}

impl TestEnv {
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("reel-queue").unwrap();
        cmd.env("REELCAST_CONFIG", &self.config_path)
            .env_remove("REELCAST_DB_PATH")
            .env_remove("REELCAST_INSTAGRAM_TOKEN")
            .env_remove("RUST_LOG");
        cmd
    }

    /// Write a fake video file and return its path
    pub fn video(&self, name: &str) -> String {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, b"fake video").unwrap();
        path.to_string_lossy().to_string()
    }

    pub async fn db(&self) -> Database {
        Database::new(&self.db_path).await.unwrap()
    }

    /// Insert a post with the given status, scheduled `offset_secs` from now
    pub async fn insert_post(&self, id: &str, status: PostStatus, offset_secs: i64) -> Post {
        let now = chrono::Utc::now().timestamp();
        let video = self.video(&format!("{}.mp4", id));
        let mut post = Post::new(
            format!("Caption {}", id),
            Some(Media::reel(video)),
            Some(now + offset_secs),
        );
        post.id = id.to_string();
        post.status = status;
        self.db().await.insert(&post).await.unwrap();
        post
    }

    pub async fn stored(&self, id: &str) -> Option<Post> {
        self.db().await.get_by_id(id).await.unwrap()
    }
}
