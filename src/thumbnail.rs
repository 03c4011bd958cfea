use eframe::egui::ColorImage;

/// Thumbnails wider than this are scaled down before upload to the GPU
const MAX_WIDTH: u32 = 160;

/// Downloads and decodes a playlist thumbnail. Blocking; run it off the UI thread.
pub fn fetch_thumbnail(url: &str) -> Option<ColorImage> {
    let resp = match reqwest::blocking::get(url).and_then(|r| r.error_for_status()) {
        Ok(resp) => resp.bytes().ok()?,
        Err(e) => {
            tracing::debug!("Thumbnail {url} unavailable: {e}");
            return None;
        }
    };
    decode_thumbnail(&resp)
}

/// Decodes image bytes into an egui image, shrinking large ones.
pub fn decode_thumbnail(bytes: &[u8]) -> Option<ColorImage> {
    let mut img = image::load_from_memory(bytes).ok()?;
    if img.width() > MAX_WIDTH {
        img = img.thumbnail(MAX_WIDTH, MAX_WIDTH);
    }
    let img = img.to_rgba8();
    let size = [img.width() as usize, img.height() as usize];
    Some(ColorImage::from_rgba_unmultiplied(size, &img))
}
