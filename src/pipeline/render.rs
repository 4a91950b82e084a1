//! Page images for the vision pass: rasterise with pdfium, encode as PNG.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and must not run on a Tokio worker. Rendering moves to the blocking
//! pool.
//!
//! ## Why PNG at `detail: "high"`?
//!
//! Checkbox ticks and small print are the whole point of showing the model
//! the page. Lossless PNG keeps them crisp, and high detail lets the model
//! tile the image instead of looking at a single downscaled overview.

use crate::error::ExtractError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

/// A rendered page, 0-based.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page: usize,
    pub image: DynamicImage,
}

/// Rasterise every page of a PDF at `dpi`, longest edge capped at
/// `max_pixels`.
pub async fn render_pdf(pdf_path: &Path, dpi: u32, max_pixels: u32) -> Result<Vec<PageImage>, ExtractError> {
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || render_blocking(&path, dpi, max_pixels))
        .await
        .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))?
}

/// Pixel width of a page `width_pt` points wide at `dpi`, capped.
fn target_width(width_pt: f32, dpi: u32, max_pixels: u32) -> i32 {
    let px = (width_pt * dpi as f32 / 72.0).round() as i32;
    px.clamp(1, max_pixels as i32)
}

fn render_blocking(pdf_path: &Path, dpi: u32, max_pixels: u32) -> Result<Vec<PageImage>, ExtractError> {
    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| ExtractError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut out = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width(page.width().value, dpi, max_pixels))
            .set_maximum_height(max_pixels as i32);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| ExtractError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;
        let image = bitmap.as_image();
        debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());
        out.push(PageImage { page: idx, image });
    }
    Ok(out)
}

/// Encode a page as a base64 PNG attachment.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, ExtractError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| ExtractError::Internal(format!("PNG encoding failed: {}", e)))?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Encode every page, in page order.
pub fn encode_pages(pages: &[PageImage]) -> Result<Vec<ImageData>, ExtractError> {
    pages.iter().map(|p| encode_page(&p.image)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn target_width_follows_dpi_and_cap() {
        // US Letter is 612pt wide.
        assert_eq!(target_width(612.0, 72, 2000), 612);
        assert_eq!(target_width(612.0, 150, 2000), 1275);
        assert_eq!(target_width(612.0, 300, 2000), 2000);
    }

    #[test]
    fn encodes_png_base64() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255])));
        let data = encode_page(&img).unwrap();
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).unwrap();
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn encodes_pages_in_order() {
        let pages: Vec<PageImage> = (0..3)
            .map(|page| PageImage {
                page,
                image: DynamicImage::ImageRgba8(RgbaImage::new(2, 2)),
            })
            .collect();
        assert_eq!(encode_pages(&pages).unwrap().len(), 3);
    }
}
