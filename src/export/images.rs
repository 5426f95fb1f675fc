use std::{sync::Arc, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::DynamicImage;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::models::Achievement;

/// ImageSlot
///
/// What goes in the image area of a PDF page.
#[derive(Debug, Clone)]
pub enum ImageSlot {
    Loaded(DynamicImage),
    /// The record names an image but it could not be decoded or fetched.
    Unavailable,
    /// The record has no image at all.
    Missing,
}

/// Decodes the payload of a `data:<mime>;base64,<payload>` URL.
pub fn decode_data_url(url: &str) -> Option<Vec<u8>> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    if !meta.ends_with(";base64") {
        return None;
    }
    STANDARD.decode(payload.trim()).ok()
}

fn decode(bytes: &[u8]) -> ImageSlot {
    match image::load_from_memory(bytes) {
        Ok(img) => ImageSlot::Loaded(img),
        Err(e) => {
            tracing::warn!(error = %e, "export image could not be decoded");
            ImageSlot::Unavailable
        }
    }
}

async fn fetch(client: &reqwest::Client, url: &str, timeout: Duration) -> ImageSlot {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status);

    let bytes = match response {
        Ok(response) => response.bytes().await,
        Err(e) => Err(e),
    };
    match bytes {
        Ok(bytes) => decode(&bytes),
        Err(e) => {
            tracing::warn!(%url, error = %e, "export image could not be fetched");
            ImageSlot::Unavailable
        }
    }
}

/// load_image
///
/// Resolves an achievement's image source: inline data URLs are decoded in
/// place, http(s) URLs are fetched within `timeout`. Every failure degrades to
/// `Unavailable` so one broken image never aborts an export.
pub async fn load_image(client: &reqwest::Client, source: &str, timeout: Duration) -> ImageSlot {
    let source = source.trim();
    if source.is_empty() {
        return ImageSlot::Missing;
    }
    if source.starts_with("data:") {
        return match decode_data_url(source) {
            Some(bytes) => decode(&bytes),
            None => {
                tracing::warn!("export image has a malformed data URL");
                ImageSlot::Unavailable
            }
        };
    }
    if source.starts_with("http://") || source.starts_with("https://") {
        return fetch(client, source, timeout).await;
    }
    ImageSlot::Unavailable
}

/// Remote fetches in flight at once during one export.
const MAX_CONCURRENT_LOADS: usize = 4;

/// load_images
///
/// Loads the image of every achievement, returned in input order. Up to
/// `MAX_CONCURRENT_LOADS` sources are resolved at once, so dead URLs cost
/// about one timeout per batch instead of one each.
pub async fn load_images(
    client: &reqwest::Client,
    achievements: &[Achievement],
    timeout: Duration,
) -> Vec<ImageSlot> {
    let permits = Arc::new(Semaphore::new(MAX_CONCURRENT_LOADS));
    let mut tasks = JoinSet::new();
    for (index, achievement) in achievements.iter().enumerate() {
        let client = client.clone();
        let source = achievement.image.clone();
        let permits = permits.clone();
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            (index, load_image(&client, &source, timeout).await)
        });
    }

    let mut slots = vec![ImageSlot::Unavailable; achievements.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, slot)) => slots[index] = slot,
            Err(e) => tracing::warn!(error = %e, "export image task failed"),
        }
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use image::{ImageOutputFormat, RgbImage};
    use std::{io::Cursor, time::Instant};
    use tokio::net::TcpListener;
    use uuid::Uuid;

    use crate::models::AchievementCategory;

    fn achievement(image: &str) -> Achievement {
        Achievement {
            id: Uuid::new_v4(),
            category: AchievementCategory::Student,
            title: "Chess".to_string(),
            description: String::new(),
            date: "2024-03-15".to_string(),
            achievement_type: "Sports".to_string(),
            image: image.to_string(),
            status: None,
            email: None,
            name: None,
            roll_no: None,
            department: None,
            created_at: Utc::now(),
        }
    }

    /// A server that accepts connections and never answers.
    async fn silent_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}")
    }

    fn png_data_url() -> String {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(4, 3))
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(bytes))
    }

    #[tokio::test]
    async fn test_data_url_is_decoded() {
        let client = reqwest::Client::new();
        let slot = load_image(&client, &png_data_url(), Duration::from_secs(1)).await;
        match slot {
            ImageSlot::Loaded(img) => assert_eq!((img.width(), img.height()), (4, 3)),
            other => panic!("expected a loaded image, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_broken_sources_degrade() {
        let client = reqwest::Client::new();
        let timeout = Duration::from_secs(1);
        assert!(matches!(load_image(&client, "", timeout).await, ImageSlot::Missing));
        assert!(matches!(
            load_image(&client, "data:image/png;base64,@@@", timeout).await,
            ImageSlot::Unavailable
        ));
        assert!(matches!(
            load_image(&client, "data:image/png;base64,AAAA", timeout).await,
            ImageSlot::Unavailable
        ));
        assert!(matches!(
            load_image(&client, "ftp://example.invalid/a.png", timeout).await,
            ImageSlot::Unavailable
        ));
    }

    #[test]
    fn test_decode_data_url_requires_base64() {
        assert!(decode_data_url("data:image/png,rawbytes").is_none());
        assert_eq!(decode_data_url("data:image/png;base64,AAEC"), Some(vec![0, 1, 2]));
    }

    #[tokio::test]
    async fn test_slots_keep_input_order() {
        let client = reqwest::Client::new();
        let records = [
            achievement(""),
            achievement(&png_data_url()),
            achievement("data:image/png;base64,@@@"),
        ];
        let slots = load_images(&client, &records, Duration::from_secs(1)).await;
        assert!(matches!(slots[0], ImageSlot::Missing));
        assert!(matches!(slots[1], ImageSlot::Loaded(_)));
        assert!(matches!(slots[2], ImageSlot::Unavailable));
    }

    #[tokio::test]
    async fn test_dead_urls_time_out_together() {
        let base = silent_server().await;
        let client = reqwest::Client::new();
        let timeout = Duration::from_millis(500);
        let records: Vec<Achievement> = (0..MAX_CONCURRENT_LOADS)
            .map(|i| achievement(&format!("{base}/cert-{i}.png")))
            .collect();

        let started = Instant::now();
        let slots = load_images(&client, &records, timeout).await;

        assert!(slots.iter().all(|s| matches!(s, ImageSlot::Unavailable)));
        // One after another would take MAX_CONCURRENT_LOADS timeouts.
        assert!(started.elapsed() < timeout * 3, "took {:?}", started.elapsed());
    }
}
