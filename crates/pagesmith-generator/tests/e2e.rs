//! End-to-end tests for Pagesmith builds.
//!
//! These tests run full builds into temporary directories and check the
//! written files, the cache and the build report.

use std::{
    fs,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::FutureExt;
use pagesmith_core::{CachePolicy, Config, StaticPathEntry};
use pagesmith_generator::{
    Builder, ManualClock, PageCache, PageDefinition, SiteLoader, cache::{Lookup, RenderFuture},
};
use pagesmith_render::{AdapterRegistry, Component, Node};
use tempfile::TempDir;

fn config(dir: &Path) -> Config {
    let mut config = Config::new("E2E", "https://example.com");
    config.build.output_dir = dir.join("public");
    config.build.assets_dir = dir.join("assets");
    config
}

fn read(dir: &Path, file: &str) -> String {
    fs::read_to_string(dir.join("public").join(file)).unwrap()
}

/// A tree component that renders `v<n>` where `n` counts its invocations.
fn versioned(calls: &Arc<AtomicUsize>) -> Arc<Component> {
    let calls = Arc::clone(calls);
    Arc::new(Component::tree("versioned", "versioned.rs", move |_props, _ctx| {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move { Ok(Node::element("p").child(Node::text(format!("v{n}")))) }.boxed()
    }))
}

#[tokio::test]
async fn test_static_page_round_trip() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let page = PageDefinition::new("/", versioned(&calls))
        .unwrap()
        .with_cache(CachePolicy::Static);

    let cache = PageCache::new();
    let builder = Builder::new(config(dir.path()))
        .unwrap()
        .with_cache(cache.clone());

    let first = builder.build(std::slice::from_ref(&page)).await.unwrap();
    let first_html = read(dir.path(), "index.html");
    assert_eq!(first.stats.rendered, 1);

    let second = builder.build(std::slice::from_ref(&page)).await.unwrap();
    let second_html = read(dir.path(), "index.html");
    assert_eq!(second.stats.cached, 1);
    assert_eq!(second.stats.rendered, 0);

    assert_eq!(first_html, second_html);
    assert!(first_html.contains("<p>v1</p>"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get("/").unwrap().html, first_html);
}

#[tokio::test]
async fn test_timed_page_revalidates() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let page = PageDefinition::new("/news", versioned(&calls))
        .unwrap()
        .with_cache(CachePolicy::timed(5, ["news"]));

    let clock = Arc::new(ManualClock::at_epoch());
    let cache = PageCache::with_clock(clock.clone());
    let builder = Builder::new(config(dir.path()))
        .unwrap()
        .with_cache(cache.clone());
    let pages = std::slice::from_ref(&page);

    let t0 = builder.build(pages).await.unwrap();
    assert_eq!(t0.stats.rendered, 1);
    assert!(read(dir.path(), "news/index.html").contains("v1"));

    clock.advance_secs(3);
    let t3 = builder.build(pages).await.unwrap();
    assert_eq!(t3.stats.cached, 1);
    assert!(read(dir.path(), "news/index.html").contains("v1"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance_secs(3);
    let t6 = builder.build(pages).await.unwrap();
    assert_eq!(t6.stats.stale, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    clock.advance_secs(1);
    let t7 = builder.build(pages).await.unwrap();
    assert_eq!(t7.stats.cached, 1);
    assert!(read(dir.path(), "news/index.html").contains("v2"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dynamic_route_writes_each_path() {
    let dir = TempDir::new().unwrap();
    let component =
        Component::template("post", "post.html", "<h1>{{ title }}</h1>").unwrap();
    let page = PageDefinition::new("/dynamic/[slug]", Arc::new(component))
        .unwrap()
        .with_paths(vec![
            StaticPathEntry::new([("slug", "a")]),
            StaticPathEntry::new([("slug", "b")]),
        ])
        .with_static_props(|params| {
            async move {
                let slug = params.get("slug").cloned().unwrap_or_default();
                Ok(pagesmith_core::PageProps {
                    props: serde_json::json!({ "title": format!("Post {slug}") }),
                    ..Default::default()
                })
            }
            .boxed()
        });

    let report = Builder::new(config(dir.path()))
        .unwrap()
        .build(&[page])
        .await
        .unwrap();

    assert_eq!(report.paths, vec!["/dynamic/a", "/dynamic/b"]);
    assert!(read(dir.path(), "dynamic/a/index.html").contains("<h1>Post a</h1>"));
    assert!(read(dir.path(), "dynamic/b/index.html").contains("<h1>Post b</h1>"));
}

#[tokio::test]
async fn test_tag_invalidation_rerenders_tagged_pages() {
    let dir = TempDir::new().unwrap();
    let post_calls = Arc::new(AtomicUsize::new(0));
    let about_calls = Arc::new(AtomicUsize::new(0));
    let pages = vec![
        PageDefinition::new("/blog/post", versioned(&post_calls))
            .unwrap()
            .with_cache(CachePolicy::timed(3600, ["posts", "blog"])),
        PageDefinition::new("/about", versioned(&about_calls))
            .unwrap()
            .with_cache(CachePolicy::timed(3600, ["pages"])),
    ];

    let cache = PageCache::new();
    let builder = Builder::new(config(dir.path()))
        .unwrap()
        .with_cache(cache.clone());

    builder.build(&pages).await.unwrap();
    assert_eq!(cache.invalidate_by_tag("posts"), 1);
    assert!(cache.get("/blog/post").is_none());
    assert!(cache.get("/about").is_some());

    let report = builder.build(&pages).await.unwrap();
    assert_eq!(report.stats.rendered, 1);
    assert_eq!(report.stats.cached, 1);
    assert_eq!(post_calls.load(Ordering::SeqCst), 2);
    assert_eq!(about_calls.load(Ordering::SeqCst), 1);
    assert!(read(dir.path(), "blog/post/index.html").contains("v2"));
}

fn slow_render(calls: &Arc<AtomicUsize>) -> impl FnOnce() -> RenderFuture + use<> {
    let calls = Arc::clone(calls);
    move || -> RenderFuture {
        calls.fetch_add(1, Ordering::SeqCst);
        async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            Ok("fresh".to_string())
        }
        .boxed()
    }
}

#[tokio::test]
async fn test_concurrent_stale_reads_collapse() {
    let clock = Arc::new(ManualClock::at_epoch());
    let cache = PageCache::with_clock(clock.clone());
    let policy = CachePolicy::timed(5, ["posts"]);
    cache.put("/p", "old", &policy);
    clock.advance_secs(6);

    let calls = Arc::new(AtomicUsize::new(0));
    let (a, b) = tokio::join!(
        cache.get_or_render("/p", &policy, slow_render(&calls)),
        cache.get_or_render("/p", &policy, slow_render(&calls)),
    );
    assert_eq!(a.unwrap(), Lookup::Stale("old".to_string()));
    assert_eq!(b.unwrap(), Lookup::Stale("old".to_string()));

    cache.drain().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get("/p").unwrap().html, "fresh");
}

#[tokio::test]
async fn test_site_directory_build() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let write = |path: &str, content: &str| {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    };

    write("assets/base.css", "body {}");
    write("assets/header.css", "header {}");
    write("assets/counter.js", "export {}");
    write(
        "components/header.html",
        "---\nstylesheets: [header.css]\nscripts: [counter.js]\n---\n<header>{{ site }}</header>",
    );
    write(
        "pages/index.html",
        "---\ntitle: Home\nstylesheets: [base.css]\ncomponents:\n  - { name: header, only: stylesheets }\nprops: { site: Demo }\n---\n{{> header }}<main>home</main>",
    );
    write(
        "pages/posts/[slug].md",
        "---\ncache: { revalidate: 60, tags: [posts] }\nstylesheets: [base.css]\npaths:\n  - params: { slug: first }\n    props: { body: \"<b>hi</b>\" }\n---\n# {{ params.slug }}\n\n{{ body }}",
    );

    let config = config(root);
    let adapters = AdapterRegistry::with_defaults();
    let site = SiteLoader::new(&config, root, &adapters).load().unwrap();

    let report = Builder::new(config)
        .unwrap()
        .with_components(site.components)
        .build(&site.pages)
        .await
        .unwrap();

    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(report.paths, vec!["/", "/posts/first"]);

    let home = read(root, "index.html");
    assert!(home.contains("<header>Demo</header>"));
    let base = home.find("base.css").unwrap();
    let header = home.find("header.css").unwrap();
    assert!(base < header);
    assert!(!home.contains("counter.js"));

    let post = read(root, "posts/first/index.html");
    assert!(post.contains("<h1>first</h1>"));
    assert!(post.contains("&lt;b&gt;hi&lt;/b&gt;"));

    assert!(root.join("public/header.css").exists());
    assert!(!root.join("public/counter.js").exists());
    assert!(root.join("public/asset-manifest.json").exists());
    let sitemap = read(root, "sitemap.xml");
    assert!(sitemap.contains("<loc>https://example.com/posts/first</loc>"));
}
