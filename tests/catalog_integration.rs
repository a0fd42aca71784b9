use assert_cmd::Command;
use predicates::str;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DATA_HEADER: &str = "<plist version=\"1.0\"><dict><key>MetaDataList</key><array><dict>";
const DATA_FOOTER: &str =
    "</dict></array><key>XMLFileType</key><string>ModdXML</string></dict></plist>";

// 40194.5 days after 1899-12-30 is 2010-01-16 12:00 local, 18:00 UTC.
fn modd_text(check_code: &str) -> String {
    let mut text = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\r\n");
    text.push_str(DATA_HEADER);
    text.push_str(&format!("<key>CheckCode</key><string>{}</string>", check_code));
    text.push_str("<key>DateTimeOriginal</key><real>40194.5</real>");
    text.push_str("<key>Duration</key><real>125.5</real>");
    text.push_str("<key>FileSize</key><integer>52428800</integer>");
    text.push_str("<key>VTList</key><array><string>1:2:0.5:1.5:2.5:3</string></array>");
    text.push_str(DATA_FOOTER);
    text
}

struct Library {
    _dir: TempDir,
    config_path: PathBuf,
    watch: PathBuf,
    archive: PathBuf,
}

impl Library {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let watch = dir.path().join("camera");
        let archive = dir.path().join("archive");
        fs::create_dir_all(watch.join("1-16-2010")).unwrap();

        let config_path = dir.path().join("config.toml");
        let config = format!(
            "watch_directories = [\"{}\"]\narchive_root = \"{}\"\ndatabase_path = \"{}\"\nbatch_size = 2\n",
            watch.display(),
            archive.display(),
            dir.path().join("library.db").display()
        );
        fs::write(&config_path, config).unwrap();

        Library {
            _dir: dir,
            config_path,
            watch,
            archive,
        }
    }

    fn add_clip(&self, stem: &str, check_code: &str, content: &[u8]) -> PathBuf {
        let clip_dir = self.watch.join("1-16-2010");
        fs::write(clip_dir.join(format!("{}.modd", stem)), modd_text(check_code)).unwrap();
        let video = clip_dir.join(format!("{}.MPG", stem));
        fs::write(&video, content).unwrap();
        video
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("memreplay").unwrap();
        cmd.env("MEMREPLAY_CONFIG_PATH", &self.config_path);
        cmd
    }

    fn list(&self, what: &str) -> Vec<Value> {
        let output = self.cmd().args(["list", what]).assert().success();
        let stdout = std::str::from_utf8(&output.get_output().stdout).unwrap();
        let json: Value = serde_json::from_str(stdout).expect("Should be valid JSON");
        json.as_array().unwrap().clone()
    }
}

fn location(entry: &Value) -> &Path {
    Path::new(entry["location"].as_str().unwrap())
}

#[test]
fn test_update_catalogs_videos() {
    let library = Library::new();
    let video = library.add_clip("20100116110730", "1A2B", b"first clip");
    library.add_clip("20100116120000", "1A2C", b"second clip");

    library
        .cmd()
        .arg("update")
        .assert()
        .success()
        .stdout(str::contains("video entries: 2 added"));

    let videos = library.list("videos");
    assert_eq!(videos.len(), 2);
    let first = &videos[0];
    assert_eq!(first["name"], "20100116110730.MPG");
    assert_eq!(location(first), video);
    assert_eq!(first["container"], "MPEG");
    assert_eq!(first["video_codec"], "MPEG2");
    assert_eq!(first["modd_check_code"], 0x1A2B);
    // size reported by the sidecar, not the bytes on disk
    assert_eq!(first["file_size"], 52_428_800);
    assert_eq!(first["hash"].as_str().unwrap().len(), 64);

    assert_eq!(library.list("modds").len(), 2);
}

#[test]
fn test_update_is_idempotent() {
    let library = Library::new();
    library.add_clip("20100116110730", "1A2B", b"first clip");

    library.cmd().arg("update").assert().success();
    library
        .cmd()
        .arg("update")
        .assert()
        .success()
        .stdout(str::contains("video entries: 0 added, 0 updated, 1 unchanged"))
        .stdout(str::contains("modd entries: 0 added, 0 updated, 1 already present"));

    assert_eq!(library.list("videos").len(), 1);
}

#[test]
fn test_duplicate_content_is_catalogued_once() {
    let library = Library::new();
    let first = library.add_clip("20100116110730", "1A2B", b"same bytes");
    library.add_clip("20100116120000", "1A2C", b"same bytes");

    library
        .cmd()
        .arg("update")
        .assert()
        .success()
        .stdout(str::contains("video entries: 1 added, 0 updated, 0 unchanged, 0 rejected"));

    let videos = library.list("videos");
    assert_eq!(videos.len(), 1);
    assert_eq!(videos[0]["name"], "20100116110730.MPG");
    assert_eq!(location(&videos[0]), first);
    assert_eq!(videos[0]["modd_check_code"], 0x1A2B);
}

#[test]
fn test_update_explicit_directory_overrides_config() {
    let library = Library::new();
    library.add_clip("20100116110730", "1A2B", b"first clip");

    let elsewhere = TempDir::new().unwrap();
    library
        .cmd()
        .arg("update")
        .arg(elsewhere.path())
        .assert()
        .success()
        .stdout(str::contains("video entries: 0 added"));

    assert!(library.list("videos").is_empty());
}

#[test]
fn test_relocate_moves_into_archive_tree() {
    let library = Library::new();
    let video = library.add_clip("20100116110730", "1A2B", b"first clip");

    library
        .cmd()
        .arg("relocate")
        .assert()
        .success()
        .stdout(str::contains("videos: 1 relocated, 0 failed, 0 skipped"));

    let target_dir = library.archive.join("2010").join("January");
    assert!(!video.exists());
    assert_eq!(
        fs::read(target_dir.join("20100116110730.MPG")).unwrap(),
        b"first clip"
    );
    assert!(target_dir.join("20100116110730.modd").exists());

    let videos = library.list("videos");
    assert_eq!(location(&videos[0]), target_dir.join("20100116110730.MPG"));
    let modds = library.list("modds");
    assert_eq!(location(&modds[0]), target_dir.join("20100116110730.modd"));
}

#[test]
fn test_relocate_root_flag_overrides_config() {
    let library = Library::new();
    library.add_clip("20100116110730", "1A2B", b"first clip");

    let other = TempDir::new().unwrap();
    library
        .cmd()
        .args(["relocate", "--root"])
        .arg(other.path())
        .assert()
        .success();

    assert!(
        other
            .path()
            .join("2010")
            .join("January")
            .join("20100116110730.MPG")
            .exists()
    );
}

#[test]
fn test_inspect_prints_sidecar_and_video() {
    let library = Library::new();
    library.add_clip("20100116110730", "1A2B", b"first clip");
    let modd_path = library.watch.join("1-16-2010").join("20100116110730.modd");

    let output = library
        .cmd()
        .arg("inspect")
        .arg(&modd_path)
        .assert()
        .success();
    let stdout = std::str::from_utf8(&output.get_output().stdout).unwrap();
    let json: Value = serde_json::from_str(stdout).expect("Should be valid JSON");

    assert_eq!(json["modd"]["check_code"], 0x1A2B);
    assert_eq!(json["modd"]["date_time_actual"], 1_263_664_800i64);
    assert_eq!(json["modd"]["vt_list"].as_array().unwrap().len(), 1);
    assert_eq!(json["video"]["name"], "20100116110730.MPG");
    assert_eq!(json["video"]["container"], "MPEG");
}

#[test]
fn test_inspect_missing_file_fails() {
    let library = Library::new();
    library
        .cmd()
        .args(["inspect", "/definitely/not/here.modd"])
        .assert()
        .failure()
        .stderr(str::contains("Error reading /definitely/not/here.modd"));
}

#[test]
fn test_update_without_directories_fails() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        format!("database_path = \"{}\"\n", dir.path().join("library.db").display()),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("memreplay").unwrap();
    cmd.env("MEMREPLAY_CONFIG_PATH", &config_path)
        .arg("update")
        .assert()
        .failure()
        .stderr(str::contains("no watch_directories configured"));
}
