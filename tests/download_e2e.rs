//! End-to-end download tests against a mock site.
//!
//! These spin up a wiremock server standing in for every site host (the
//! metadata host, the sharded image hosts, the list endpoints) and drive
//! the full pipeline: resolution, conflict policy, write sessions,
//! checkpointing.

use std::path::Path;

use hitomi_dl::fetch::SafeRequest;
use hitomi_dl::hitomi::{Endpoints, HitomiClient};
use hitomi_dl::pipeline::{
    DownloadOptions, FailureMode, IfExists, Pipeline, PipelineError, RunStats,
};
use hitomi_dl::progress::Progress;
use hitomi_dl::{SinkError, checkpoint};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Sharding document: directory token 1727, no hash bucket in the case
/// list, so every image routes to pool 0 (subdomain w1).
const GG_JS: &str = "b: '1727/'\ncase 9999999:\no = 0;\no = 1;";

const IMAGE_ONE: &[u8] = b"IMG-ONE-BYTES";
const IMAGE_TWO: &[u8] = b"IMG-TWO-BYTES";

/// Hash tails: "a01" -> bucket 0x1a0 = 416, "b02" -> bucket 0x2b0 = 688.
const HASH_ONE: &str = "deadbeefa01";
const HASH_TWO: &str = "deadbeefb02";

fn endpoints(server: &MockServer) -> Endpoints {
    Endpoints {
        ltn: Url::parse(&format!("{}/ltn/", server.uri())).expect("ltn url"),
        images: format!("{}/images/{{subdomain}}", server.uri()),
        streaming: Url::parse(&format!("{}/streaming/", server.uri())).expect("streaming url"),
        referer: Url::parse(&format!("{}/", server.uri())).expect("referer url"),
    }
}

fn pipeline(server: &MockServer) -> Pipeline {
    let client = HitomiClient::new(reqwest::Client::new(), endpoints(server));
    Pipeline::new(client, SafeRequest::new())
}

fn gallery_js(id: u32) -> String {
    format!(
        r#"var galleryinfo = {{
            "id": "{id}",
            "title": "Sample Gallery",
            "japanese_title": "サンプル",
            "type": "doujinshi",
            "language": "japanese",
            "datepublished": "2023-08-09",
            "files": [
                {{"hash": "{HASH_ONE}", "name": "01.jpg", "width": 1280, "height": 1810}},
                {{"hash": "{HASH_TWO}", "name": "02.jpg", "width": 1280, "height": 1812}}
            ],
            "artists": [{{"artist": "someone", "url": "/artist/someone-all.html"}}],
            "tags": [{{"tag": "glasses", "url": "/tag/glasses-all.html"}}]
        }};"#
    )
}

async fn mount_gallery(server: &MockServer, id: u32) {
    Mock::given(method("GET"))
        .and(path("/ltn/gg.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string(GG_JS))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/ltn/galleries/{id}.js")))
        .respond_with(ResponseTemplate::new(200).set_body_string(gallery_js(id)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/images/w1/1727/416/{HASH_ONE}.webp")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(IMAGE_ONE.to_vec()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/images/w1/1727/688/{HASH_TWO}.webp")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(IMAGE_TWO.to_vec()))
        .mount(server)
        .await;
}

fn options(output: String) -> DownloadOptions {
    DownloadOptions {
        output,
        ..DownloadOptions::default()
    }
}

async fn run(
    pipeline: &Pipeline,
    ids: &[u32],
    options: &DownloadOptions,
) -> Result<RunStats, PipelineError> {
    pipeline
        .run(ids, options, FailureMode::Abort, &Progress::new(true))
        .await
}

fn template_under(dir: &Path, template: &str) -> String {
    format!("{}/{template}", dir.display())
}

#[tokio::test]
async fn test_directory_download_writes_assets_and_comicinfo() {
    let server = MockServer::start().await;
    mount_gallery(&server, 3_287_639).await;
    let temp = tempfile::tempdir().expect("tempdir");

    let pipeline = pipeline(&server);
    let options = options(template_under(temp.path(), "{id}"));
    let stats = run(&pipeline, &[3_287_639], &options).await.expect("run");

    assert_eq!(stats.completed, 1);
    let gallery_dir = temp.path().join("3287639");
    assert_eq!(std::fs::read(gallery_dir.join("1.jpg")).expect("asset 1"), IMAGE_ONE);
    assert_eq!(std::fs::read(gallery_dir.join("2.jpg")).expect("asset 2"), IMAGE_TWO);

    let xml = std::fs::read_to_string(gallery_dir.join("ComicInfo.xml")).expect("sidecar");
    assert!(xml.contains("<Title>サンプル</Title>"));
    assert!(xml.contains("<LanguageISO>ja-JP</LanguageISO>"));
}

#[tokio::test]
async fn test_download_is_deterministic_across_runs() {
    let server = MockServer::start().await;
    mount_gallery(&server, 77).await;
    let temp = tempfile::tempdir().expect("tempdir");

    let pipeline = pipeline(&server);
    let first = options(template_under(temp.path(), "one/{id}"));
    let second = options(template_under(temp.path(), "two/{id}"));
    run(&pipeline, &[77], &first).await.expect("first run");
    run(&pipeline, &[77], &second).await.expect("second run");

    for name in ["1.jpg", "2.jpg", "ComicInfo.xml"] {
        let a = std::fs::read(temp.path().join("one/77").join(name)).expect("first copy");
        let b = std::fs::read(temp.path().join("two/77").join(name)).expect("second copy");
        assert_eq!(a, b, "mismatch for {name}");
    }
}

#[tokio::test]
async fn test_archive_download_matches_directory_output() {
    let server = MockServer::start().await;
    mount_gallery(&server, 55).await;
    let temp = tempfile::tempdir().expect("tempdir");

    let pipeline = pipeline(&server);
    run(&pipeline, &[55], &options(template_under(temp.path(), "dir/{id}")))
        .await
        .expect("directory run");
    run(&pipeline, &[55], &options(template_under(temp.path(), "{id}.cbz")))
        .await
        .expect("archive run");

    let archive_file = std::fs::File::open(temp.path().join("55.cbz")).expect("archive");
    let mut archive = zip::ZipArchive::new(archive_file).expect("open archive");

    let dir = temp.path().join("dir/55");
    let mut dir_names: Vec<String> = std::fs::read_dir(&dir)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    dir_names.sort();
    let mut zip_names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).expect("entry").name().to_string())
        .collect();
    zip_names.sort();
    assert_eq!(dir_names, zip_names);

    for name in &dir_names {
        let mut entry = archive.by_name(name).expect("zip entry");
        let mut from_zip = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut from_zip).expect("read entry");
        let from_dir = std::fs::read(dir.join(name)).expect("read file");
        assert_eq!(from_zip, from_dir, "content mismatch for {name}");
    }
}

#[tokio::test]
async fn test_checkpoint_resume_downloads_only_missing_ids() {
    let server = MockServer::start().await;
    mount_gallery(&server, 1).await;
    mount_gallery(&server, 4).await;
    let temp = tempfile::tempdir().expect("tempdir");

    let checkpoint_path = temp.path().join("done.txt");
    std::fs::write(&checkpoint_path, "2\n3\n").expect("seed checkpoint");

    let pipeline = pipeline(&server);
    let mut options = options(template_under(temp.path(), "{id}"));
    options.checkpoint = Some(checkpoint_path.clone());

    let stats = run(&pipeline, &[1, 2, 3, 4], &options).await.expect("run");

    assert_eq!(stats.skipped_checkpoint, 2);
    assert_eq!(stats.completed, 2);
    assert!(temp.path().join("1").is_dir());
    assert!(temp.path().join("4").is_dir());
    assert!(!temp.path().join("2").exists());
    assert!(!temp.path().join("3").exists());

    let mut recorded = checkpoint::load(Some(&checkpoint_path)).await.expect("reload");
    recorded.sort_unstable();
    assert_eq!(recorded, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_if_exists_error_aborts_without_writes() {
    let server = MockServer::start().await;
    mount_gallery(&server, 9).await;
    let temp = tempfile::tempdir().expect("tempdir");

    let destination = temp.path().join("9");
    std::fs::create_dir_all(&destination).expect("pre-create");
    std::fs::write(destination.join("keep.txt"), "old").expect("marker");

    let pipeline = pipeline(&server);
    let result = run(&pipeline, &[9], &options(template_under(temp.path(), "{id}"))).await;

    assert!(matches!(result, Err(PipelineError::AlreadyExists { .. })));
    assert_eq!(
        std::fs::read_to_string(destination.join("keep.txt")).expect("marker intact"),
        "old"
    );
    assert!(!destination.join("1.jpg").exists());
}

#[tokio::test]
async fn test_if_exists_skip_leaves_destination_untouched() {
    let server = MockServer::start().await;
    mount_gallery(&server, 9).await;
    let temp = tempfile::tempdir().expect("tempdir");

    let destination = temp.path().join("9");
    std::fs::create_dir_all(&destination).expect("pre-create");
    std::fs::write(destination.join("keep.txt"), "old").expect("marker");

    let pipeline = pipeline(&server);
    let mut opts = options(template_under(temp.path(), "{id}"));
    opts.if_exists = IfExists::Skip;
    let stats = run(&pipeline, &[9], &opts).await.expect("run");

    assert_eq!(stats.skipped_existing, 1);
    assert_eq!(stats.completed, 0);
    assert!(!destination.join("1.jpg").exists());
}

#[tokio::test]
async fn test_if_exists_overwrite_replaces_destination() {
    let server = MockServer::start().await;
    mount_gallery(&server, 9).await;
    let temp = tempfile::tempdir().expect("tempdir");

    let destination = temp.path().join("9");
    std::fs::create_dir_all(&destination).expect("pre-create");
    std::fs::write(destination.join("stale.txt"), "old").expect("marker");

    let pipeline = pipeline(&server);
    let mut opts = options(template_under(temp.path(), "{id}"));
    opts.if_exists = IfExists::Overwrite;
    let stats = run(&pipeline, &[9], &opts).await.expect("run");

    assert_eq!(stats.completed, 1);
    assert!(!destination.join("stale.txt").exists());
    assert_eq!(std::fs::read(destination.join("1.jpg")).expect("fresh asset"), IMAGE_ONE);
}

#[tokio::test]
async fn test_failed_asset_fails_gallery_and_skips_checkpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ltn/gg.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string(GG_JS))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ltn/galleries/13.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gallery_js(13)))
        .mount(&server)
        .await;
    // First asset resolves, second 404s.
    Mock::given(method("GET"))
        .and(path(format!("/images/w1/1727/416/{HASH_ONE}.webp")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(IMAGE_ONE.to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/images/w1/1727/688/{HASH_TWO}.webp")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().expect("tempdir");
    let checkpoint_path = temp.path().join("done.txt");
    let pipeline = pipeline(&server);
    let mut opts = options(template_under(temp.path(), "{id}"));
    opts.checkpoint = Some(checkpoint_path.clone());

    let result = run(&pipeline, &[13], &opts).await;

    match result {
        Err(PipelineError::Sink(SinkError::Aggregate { errors })) => {
            assert_eq!(errors.len(), 1);
        }
        other => panic!("expected aggregate sink error, got {other:?}"),
    }
    // The failed gallery must not be checkpointed.
    assert_eq!(
        checkpoint::load(Some(&checkpoint_path)).await.expect("load"),
        Vec::<u32>::new()
    );
}

#[tokio::test]
async fn test_continue_mode_logs_failure_and_keeps_going() {
    let server = MockServer::start().await;
    mount_gallery(&server, 21).await;
    // Gallery 20's metadata is missing entirely.
    Mock::given(method("GET"))
        .and(path("/ltn/galleries/20.js"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().expect("tempdir");
    let pipeline = pipeline(&server);
    let opts = options(template_under(temp.path(), "{id}"));

    let stats = pipeline
        .run(&[20, 21], &opts, FailureMode::Continue, &Progress::new(true))
        .await
        .expect("resilient run");

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 1);
    assert!(temp.path().join("21").is_dir());
}

#[tokio::test]
async fn test_search_resolution_intersects_lists() {
    let server = MockServer::start().await;
    let ids = |values: &[u32]| -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    };
    Mock::given(method("GET"))
        .and(path("/ltn/tag/glasses-all.nozomi"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(ids(&[1, 2, 3])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ltn/artist/someone-all.nozomi"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(ids(&[2, 3, 4])))
        .mount(&server)
        .await;

    let pipeline = pipeline(&server);
    let resolved = pipeline
        .resolve("https://hitomi.la/search.html?tag:glasses%20artist:someone")
        .await
        .expect("resolve");

    assert_eq!(resolved, vec![2, 3]);
}

#[tokio::test]
async fn test_list_fetch_failure_aborts_resolution() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ltn/tag/glasses-all.nozomi"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let pipeline = pipeline(&server);
    let result = pipeline
        .resolve("https://hitomi.la/tag/glasses-all.html")
        .await;

    assert!(result.is_err(), "list failure must abort resolution");
}
