use relocator::{
    transform, AuxiliarySpec, FetchError, RelocateConfig, RelocateError, Relocator, RewriteRule,
    Stage,
};
use std::io::{Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Helper to build an in-memory ZIP archive; names ending in '/' become
/// directories.
fn create_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    use zip::write::{SimpleFileOptions, ZipWriter};

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in files {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
    }

    zip.finish().unwrap().into_inner()
}

/// Helper to list (name, is_dir, content) of every entry in archive order.
fn read_zip(bytes: &[u8]) -> Vec<(String, bool, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        out.push((file.name().to_string(), file.is_dir(), data));
    }
    out
}

fn public_to_img(text_extensions: &[&str]) -> RelocateConfig {
    let mut config = RelocateConfig::with_rule(RewriteRule::new("public/", "img/").unwrap());
    config.text_extensions = text_extensions.iter().map(|e| e.to_string()).collect();
    config
}

fn aux(locator: &str, name: &str) -> AuxiliarySpec {
    AuxiliarySpec::new(Url::parse(locator).unwrap(), name)
}

async fn no_fetch(url: Url) -> Result<Vec<u8>, FetchError> {
    panic!("unexpected fetch of {}", url)
}

fn binary_payload() -> Vec<u8> {
    (0..100u32).map(|i| (i * 37 % 256) as u8).collect()
}

#[tokio::test]
async fn test_transform_end_to_end_scenario() {
    let png = binary_payload();
    let html = b"<img src=\"public/b.png\"><a href=\"/dl?f=public%2Fb.png\">public/b.png</a>";
    let input = create_zip(&[
        ("public/a.html", html),
        ("public/b.png", &png),
        ("other/c.txt", b"see public/b.png"),
    ]);

    let output = transform(input, &public_to_img(&[".html"]), no_fetch)
        .await
        .unwrap();
    let entries = read_zip(&output);

    let names: Vec<_> = entries.iter().map(|(n, _, _)| n.as_str()).collect();
    assert_eq!(names, vec!["img/a.html", "img/b.png", "other/c.txt"]);

    let html_out = String::from_utf8(entries[0].2.clone()).unwrap();
    assert_eq!(
        html_out,
        "<img src=\"img/b.png\"><a href=\"/dl?f=img%2Fb.png\">img/b.png</a>"
    );
    assert!(!html_out.contains("public/"));
    assert!(!html_out.contains("public%2F"));

    // Binary passthrough
    assert_eq!(entries[1].2, png);

    // Not renamed, and .txt is not a text extension
    assert_eq!(entries[2].2, b"see public/b.png");
}

#[tokio::test]
async fn test_transform_auxiliary_injection() {
    let input = create_zip(&[]);
    let mut config = public_to_img(&[".html"]);
    config.auxiliaries = vec![aux("https://cdn.example.com/x.js", "x.js")];

    let fetch = |_url: Url| async { Ok::<_, FetchError>(b"console.log(1)".to_vec()) };
    let output = transform(input, &config, fetch).await.unwrap();
    let entries = read_zip(&output);

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "x.js");
    assert_eq!(entries[0].2, b"console.log(1)");
}

#[tokio::test]
async fn test_transform_order_preserved() {
    let input = create_zip(&[
        ("z.css", b"body{background:url(public/bg.png)}"),
        ("public/", b""),
        ("public/bg.png", b"\x89PNG"),
        ("a.html", b"<link href=\"public/site.css\">"),
    ]);
    let mut config = public_to_img(&[".html", ".css"]);
    config.auxiliaries = vec![
        aux("https://example.com/slow.js", "slow.js"),
        aux("https://example.com/fast.js", "fast.js"),
        aux("https://example.com/mid.js", "mid.js"),
    ];

    // Completion order differs from configured order
    let fetch = |url: Url| async move {
        let delay = match url.path() {
            "/slow.js" => 60,
            "/mid.js" => 30,
            _ => 0,
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok::<_, FetchError>(url.path().as_bytes().to_vec())
    };
    let output = transform(input, &config, fetch).await.unwrap();
    let entries = read_zip(&output);

    let names: Vec<_> = entries.iter().map(|(n, _, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "z.css",
            "img/",
            "img/bg.png",
            "a.html",
            "slow.js",
            "fast.js",
            "mid.js"
        ]
    );
    assert!(entries[1].1);
    assert_eq!(entries[0].2, b"body{background:url(img/bg.png)}");
    assert_eq!(entries[3].2, b"<link href=\"img/site.css\">");
    assert_eq!(entries[4].2, b"/slow.js");
}

#[tokio::test]
async fn test_transform_fetch_failure_is_fail_fast() {
    let input = create_zip(&[("public/a.html", b"public/")]);
    let mut config = public_to_img(&[".html"]);
    config.auxiliaries = vec![
        aux("https://example.com/hang.js", "hang.js"),
        aux("https://example.com/missing.js", "missing.js"),
    ];

    let fetch = |url: Url| async move {
        if url.path() == "/missing.js" {
            return Err(FetchError::Status(404));
        }
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(Vec::new())
    };

    let result = tokio::time::timeout(Duration::from_secs(10), transform(input, &config, fetch))
        .await
        .expect("transform should not wait for the hanging fetch");

    match result {
        Err(RelocateError::FetchFailed { locator, cause }) => {
            assert_eq!(locator, "https://example.com/missing.js");
            assert!(matches!(cause, FetchError::Status(404)));
        }
        other => panic!("expected FetchFailed, got {:?}", other.map(|b| b.len())),
    }
}

#[tokio::test]
async fn test_transform_panicking_fetch_names_locator() {
    let input = create_zip(&[("public/a.png", b"png")]);
    let mut config = public_to_img(&[]);
    config.auxiliaries = vec![
        aux("https://example.com/fine.js", "fine.js"),
        aux("https://example.com/crash.js", "crash.js"),
    ];

    let fetch = |url: Url| async move {
        if url.path() == "/crash.js" {
            panic!("fetcher crashed");
        }
        Ok::<_, FetchError>(Vec::new())
    };

    match transform(input, &config, fetch).await {
        Err(RelocateError::FetchFailed { locator, cause }) => {
            assert_eq!(locator, "https://example.com/crash.js");
            assert!(matches!(cause, FetchError::Task(_)));
        }
        other => panic!("expected FetchFailed, got {:?}", other.map(|b| b.len())),
    }
}

#[tokio::test]
async fn test_transform_corrupt_archive() {
    let result = transform(b"PK\x03\x04 not really".to_vec(), &public_to_img(&[]), no_fetch).await;
    assert!(matches!(result, Err(RelocateError::CorruptArchive(_))));
}

#[tokio::test]
async fn test_transform_decode_error_names_entry() {
    let input = create_zip(&[
        ("public/ok.html", b"fine"),
        ("public/broken.html", &[0xc3, 0x28]),
    ]);
    let result = transform(input, &public_to_img(&[".html"]), no_fetch).await;
    match result {
        Err(RelocateError::Decode { path, charset }) => {
            assert_eq!(path, "public/broken.html");
            assert_eq!(charset, "UTF-8");
        }
        other => panic!("expected Decode, got {:?}", other.map(|b| b.len())),
    }
}

#[tokio::test]
async fn test_transform_unmatched_entries_unchanged() {
    let input = create_zip(&[
        ("assets/public/x.html", b"public/y"),
        ("publicx/y.html", b"nothing"),
    ]);
    let output = transform(input, &public_to_img(&[".html"]), no_fetch)
        .await
        .unwrap();
    let entries = read_zip(&output);
    assert_eq!(entries[0].0, "assets/public/x.html");
    // Content rewriting is not anchored
    assert_eq!(entries[0].2, b"img/y");
    assert_eq!(entries[1].0, "publicx/y.html");
    assert_eq!(entries[1].2, b"nothing");
}

#[tokio::test]
async fn test_transform_auxiliary_overrides_existing_entry() {
    let input = create_zip(&[("x.js", b"old"), ("public/a.png", b"png")]);
    let mut config = public_to_img(&[]);
    config.auxiliaries = vec![aux("data:,new", "x.js")];

    let output = transform(input, &config, relocator::DefaultFetcher::new().unwrap())
        .await
        .unwrap();
    let entries = read_zip(&output);

    let names: Vec<_> = entries.iter().map(|(n, _, _)| n.as_str()).collect();
    assert_eq!(names, vec!["x.js", "img/a.png"]);
    assert_eq!(entries[0].2, b"new");
}

#[tokio::test]
async fn test_transform_relocation_collides_with_existing_entry() {
    let input = create_zip(&[
        ("public/a.png", b"first"),
        ("other.txt", b"x"),
        ("img/a.png", b"second"),
    ]);
    let output = transform(input, &public_to_img(&[]), no_fetch).await.unwrap();
    let entries = read_zip(&output);

    let names: Vec<_> = entries.iter().map(|(n, _, _)| n.as_str()).collect();
    assert_eq!(names, vec!["img/a.png", "other.txt"]);
    assert_eq!(entries[0].2, b"second");
}

#[tokio::test]
async fn test_transform_default_config_injects_inline_auxiliaries() {
    let input = create_zip(&[("public/index.html", b"<script src=\"public/app.js\"></script>")]);
    let relocator = Relocator::new(
        RelocateConfig::default(),
        relocator::DefaultFetcher::new().unwrap(),
    )
    .unwrap();

    let output = relocator.transform(input).await.unwrap();
    let entries = read_zip(&output.archive);

    let names: Vec<_> = entries.iter().map(|(n, _, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "img/index.html",
            "LLWebServerExtended.js",
            "scriptcustom.js",
            "ew-log-viewer.js"
        ]
    );
    assert_eq!(entries[2].2, b"console.log(\"scriptcustom\");");

    assert_eq!(output.stats.entries_read, 1);
    assert_eq!(output.stats.entries_relocated, 1);
    assert_eq!(output.stats.text_entries_rewritten, 1);
    assert_eq!(output.stats.references_rewritten, 1);
    assert_eq!(output.stats.auxiliaries_injected, 3);
    assert_eq!(output.stats.bytes_written, output.archive.len() as u64);
}

#[tokio::test]
async fn test_transform_reports_stages_in_order() {
    let input = create_zip(&[("public/a.png", b"x")]);
    let mut config = public_to_img(&[]);
    config.auxiliaries = vec![aux("data:,y", "y.js")];
    let relocator = Relocator::new(config, relocator::DefaultFetcher::new().unwrap()).unwrap();

    let seen = Mutex::new(Vec::new());
    let on_stage = |stage: &Stage| seen.lock().unwrap().push(stage.clone());
    relocator
        .transform_with(input, &on_stage, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Stage::Reading,
            Stage::Transforming,
            Stage::Fetching,
            Stage::Writing,
            Stage::Done
        ]
    );
}

#[tokio::test]
async fn test_transform_failure_stage() {
    let relocator = Relocator::new(public_to_img(&[]), no_fetch).unwrap();

    let seen = Mutex::new(Vec::new());
    let on_stage = |stage: &Stage| seen.lock().unwrap().push(stage.clone());
    let result = relocator
        .transform_with(b"garbage".to_vec(), &on_stage, Arc::new(AtomicBool::new(false)))
        .await;

    assert!(result.is_err());
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], Stage::Reading);
    assert!(matches!(seen.last(), Some(Stage::Failed(_))));
    assert_eq!(seen.len(), 2);
}

#[tokio::test]
async fn test_transform_cancelled() {
    let input = create_zip(&[("public/a.html", b"public/")]);
    let relocator = Relocator::new(public_to_img(&[".html"]), no_fetch).unwrap();

    let result = relocator
        .transform_with(input, &|_: &Stage| {}, Arc::new(AtomicBool::new(true)))
        .await;
    assert!(matches!(result, Err(RelocateError::Cancelled)));
}

#[tokio::test]
async fn test_transform_concurrent_invocations() {
    let mut config = public_to_img(&[".html"]);
    config.auxiliaries = vec![aux("https://example.com/x.js", "x.js")];

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let fetch = move |_url: Url| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, FetchError>(b"x".to_vec())
        }
    };
    let relocator = Arc::new(Relocator::new(config, fetch).unwrap());

    let mut handles = Vec::new();
    for i in 0..8 {
        let relocator = Arc::clone(&relocator);
        let body = format!("<a href=\"public/{}.png\">", i);
        let input = create_zip(&[("public/index.html", body.as_bytes())]);
        handles.push(tokio::spawn(async move { relocator.transform(input).await }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let output = handle.await.unwrap().unwrap();
        let entries = read_zip(&output.archive);
        assert_eq!(entries[0].2, format!("<a href=\"img/{}.png\">", i).into_bytes());
        assert_eq!(entries[1].0, "x.js");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_transform_rejects_invalid_auxiliary_name() {
    let mut config = public_to_img(&[]);
    config.auxiliaries = vec![aux("data:,x", "../escape.js")];
    let result = transform(create_zip(&[]), &config, no_fetch).await;
    assert!(matches!(result, Err(RelocateError::InvalidConfig(_))));
}
