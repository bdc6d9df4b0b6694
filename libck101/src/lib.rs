use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::{fs, spawn};

pub use crate::download::{file_name_from_url, reencode, ImageFetcher, ImageResult};
pub use crate::errors::{Ck101Error, ImageError};
pub use crate::page::{Page, PageExtractor};
pub use crate::session::{Session, SessionConfig, DEFAULT_LOGIN_URL};
pub use crate::thread::{target_directory, thread_id};
pub use tokio_util::sync::CancellationToken;

mod download;
mod errors;
mod page;
mod session;
mod thread;

pub const DEFAULT_MIN_IMAGE_SIZE: u32 = 400;
pub const DEFAULT_JPEG_QUALITY: u8 = 75;
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 16;

#[derive(Debug, Clone)]
pub struct DownloadRule {
    /// Images narrower than this are skipped
    pub min_width: u32,
    /// Images shorter than this are skipped
    pub min_height: u32,
    /// JPEG quality, 1 to 100
    pub jpeg_quality: u8,
    /// Upper bound on images in flight. 0 is treated as 1.
    pub max_concurrent_downloads: usize,
}

impl Default for DownloadRule {
    fn default() -> Self {
        Self {
            min_width: DEFAULT_MIN_IMAGE_SIZE,
            min_height: DEFAULT_MIN_IMAGE_SIZE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
        }
    }
}

/// Fetches a thread and saves its images under `<pictures_root>/<thread id> - <title>`.
/// Returns the directory the images were saved to.
#[tracing::instrument(skip(session, rule, cancel))]
pub async fn grab_thread(
    session: Arc<Session>,
    link: &str,
    pictures_root: &Path,
    rule: DownloadRule,
    cancel: &CancellationToken,
) -> Result<PathBuf, Ck101Error> {
    if link.is_empty() || !link.starts_with("http") {
        return Err(Ck101Error::InvalidInput(link.to_string()));
    }
    let id = thread_id(link)?;

    let page = PageExtractor::new(session.clone()).fetch(link, cancel).await?;
    tracing::debug!("{} images found in \"{}\"", page.image_urls.len(), page.title);

    let target_dir = target_directory(pictures_root, &id, &page.title);
    download_all(session, &page, &target_dir, rule, cancel).await?;
    Ok(target_dir)
}

/// Downloads every image of `page` into `target_dir` concurrently and waits for all of them.
///
/// Individual image failures are logged and never abort the batch. A page without
/// images is an error and leaves the filesystem untouched.
#[tracing::instrument(skip(session, page, rule, cancel), fields(images = page.image_urls.len()))]
pub async fn download_all(
    session: Arc<Session>,
    page: &Page,
    target_dir: &Path,
    rule: DownloadRule,
    cancel: &CancellationToken,
) -> Result<(), Ck101Error> {
    if page.image_urls.is_empty() {
        return Err(Ck101Error::NoImages);
    }

    if let Err(e) = fs::create_dir_all(target_dir).await {
        tracing::error!("Failed to create destination directory\nError : {}", e);
        return Err(Ck101Error::ErrorCreatingDestinationDirectory(format!(
            "{} : {}",
            e,
            target_dir.to_string_lossy()
        )));
    };
    tracing::info!("Target saving directory: {}", target_dir.to_string_lossy());

    let semaphore = Arc::new(Semaphore::new(rule.max_concurrent_downloads.max(1)));
    let fetcher = ImageFetcher::new(session, rule);

    let dld_tasks: Vec<JoinHandle<ImageResult>> = page
        .image_urls
        .iter()
        .map(|link| {
            download_image(
                fetcher.clone(),
                link.to_string(),
                target_dir.join(file_name_from_url(link)),
                semaphore.clone(),
                cancel.clone(),
            )
        })
        .collect();

    for (link, task) in page.image_urls.iter().zip(join_all(dld_tasks).await) {
        if let Err(e) = task {
            tracing::info!("{} [fail]: download thread panicked. {}", link, e);
        }
    }

    if cancel.is_cancelled() {
        return Err(Ck101Error::Cancelled);
    }
    Ok(())
}

fn download_image(
    fetcher: ImageFetcher,
    link: String,
    destination: PathBuf,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
) -> JoinHandle<ImageResult> {
    spawn(async move {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = semaphore.acquire_owned() => permit.ok(),
        };
        let result = match permit {
            None => ImageResult::Failed(ImageError::Cancelled),
            Some(_permit) => ImageResult::from(fetcher.fetch(&link, &destination, &cancel).await),
        };
        tracing::info!("{}", result.log_line(&link));
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::tests::encoded_image;
    use image::ImageFormat;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn anonymous_session() -> Arc<Session> {
        Arc::new(Session::anonymous(SessionConfig::default()).unwrap())
    }

    async fn image_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.png"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(encoded_image(500, 500, ImageFormat::Png)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b.jpg"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(encoded_image(100, 100, ImageFormat::Jpeg)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.gif"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        server
    }

    fn page_of(server: &MockServer, names: &[&str]) -> Page {
        Page {
            title: "My Thread".to_string(),
            image_urls: names
                .iter()
                .map(|n| format!("{}/{}", server.uri(), n))
                .collect(),
        }
    }

    fn is_jpeg(p: &Path) -> bool {
        let bytes = std::fs::read(p).unwrap();
        image::guess_format(&bytes).unwrap() == ImageFormat::Jpeg
    }

    #[tokio::test]
    async fn test_download_all_saves_large_and_skips_small() {
        let server = image_server().await;
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("T");

        let res = download_all(
            anonymous_session(),
            &page_of(&server, &["a.png", "b.jpg"]),
            &target,
            DownloadRule::default(),
            &CancellationToken::new(),
        )
        .await;
        assert!(res.is_ok());
        assert!(is_jpeg(&target.join("a.png")));
        assert!(!target.join("b.jpg").exists());
    }

    #[tokio::test]
    async fn test_download_all_without_images_touches_nothing() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("T");

        let res = download_all(
            anonymous_session(),
            &Page::default(),
            &target,
            DownloadRule::default(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(res, Err(Ck101Error::NoImages));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_download_all_twice_overwrites() {
        let server = image_server().await;
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("nested").join("T");
        let page = page_of(&server, &["a.png"]);

        for _ in 0..2 {
            download_all(
                anonymous_session(),
                &page,
                &target,
                DownloadRule::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        }
        assert!(is_jpeg(&target.join("a.png")));
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_failed_images_do_not_affect_siblings() {
        let server = image_server().await;
        let root = tempfile::tempdir().unwrap();
        let page = page_of(&server, &["broken.jpg", "gone.gif", "a.png", "b.jpg"]);

        let res = download_all(
            anonymous_session(),
            &page,
            root.path(),
            DownloadRule {
                max_concurrent_downloads: 1,
                ..Default::default()
            },
            &CancellationToken::new(),
        )
        .await;
        assert!(res.is_ok());
        assert!(is_jpeg(&root.path().join("a.png")));
        assert!(!root.path().join("broken.jpg").exists());
        assert!(!root.path().join("gone.gif").exists());
        assert!(!root.path().join("b.jpg").exists());
    }

    #[tokio::test]
    async fn test_same_file_name_collides() {
        let server = image_server().await;
        let root = tempfile::tempdir().unwrap();
        let page = Page {
            title: "dupes".to_string(),
            image_urls: vec![
                format!("{}/a.png", server.uri()),
                format!("{}/a.png?size=large", server.uri()),
            ],
        };

        download_all(
            anonymous_session(),
            &page,
            root.path(),
            DownloadRule::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 1);
        assert!(is_jpeg(&root.path().join("a.png")));
    }

    #[tokio::test]
    async fn test_download_all_logs_in_credentialed_session() {
        let server = image_server().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let session = Arc::new(
            Session::new(
                Some("bob"),
                Some("secret"),
                SessionConfig {
                    login_url: format!("{}/login", server.uri()),
                    ..Default::default()
                },
            )
            .unwrap(),
        );
        let root = tempfile::tempdir().unwrap();

        download_all(
            session.clone(),
            &page_of(&server, &["a.png", "a.png"]),
            root.path(),
            DownloadRule::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(session.is_logged_in().await);
        assert!(is_jpeg(&root.path().join("a.png")));
    }

    #[tokio::test]
    async fn test_download_all_cancelled() {
        let server = image_server().await;
        let root = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let res = download_all(
            anonymous_session(),
            &page_of(&server, &["a.png"]),
            root.path(),
            DownloadRule::default(),
            &cancel,
        )
        .await;
        assert_eq!(res, Err(Ck101Error::Cancelled));
        assert!(!root.path().join("a.png").exists());
    }

    #[tokio::test]
    async fn test_grab_thread() {
        let server = image_server().await;
        let html = format!(
            r#"<html><head><title>My Thread - CK101 Forum</title></head><body>
                <img src="t/a.png" file="{uri}/a.png">
                <img src="t/b.jpg" file="{uri}/b.jpg">
                <img src="t/c.jpg" file="static/c.jpg">
            </body></html>"#,
            uri = server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/thread-2593278-1-1.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;
        let root = tempfile::tempdir().unwrap();

        let target = grab_thread(
            anonymous_session(),
            &format!("{}/thread-2593278-1-1.html", server.uri()),
            root.path(),
            DownloadRule::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(target, root.path().join("2593278 - My Thread"));
        assert!(is_jpeg(&target.join("a.png")));
        assert!(!target.join("b.jpg").exists());
    }

    #[tokio::test]
    async fn test_grab_thread_rejects_bad_links() {
        let root = tempfile::tempdir().unwrap();
        for link in ["", "ck101.com/thread-1-1-1.html", "http://ck101.com/forum.php"] {
            let res = grab_thread(
                anonymous_session(),
                link,
                root.path(),
                DownloadRule::default(),
                &CancellationToken::new(),
            )
            .await;
            assert!(matches!(res, Err(Ck101Error::InvalidInput(_))));
        }
    }

    #[tokio::test]
    async fn test_grab_thread_page_without_images() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thread-7-1-1.html"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><head><title>Empty - CK101</title></head></html>"),
            )
            .mount(&server)
            .await;
        let root = tempfile::tempdir().unwrap();

        let res = grab_thread(
            anonymous_session(),
            &format!("{}/thread-7-1-1.html", server.uri()),
            root.path(),
            DownloadRule::default(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(res, Err(Ck101Error::NoImages));
        assert!(!root.path().join("7 - Empty").exists());
    }
}
