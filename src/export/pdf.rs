use image::DynamicImage;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Rect, Rgb, path::PaintMode,
};

use super::{ExportError, ExportRecord, ImageSlot};
use crate::dates;

// A4 portrait, millimetres. PDF origin is the bottom-left corner.
const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 20.0;
const IMAGE_W: f32 = 150.0;
const IMAGE_H: f32 = 120.0;
const IMAGE_DPI: f32 = 300.0;
const MAX_DESCRIPTION_LINES: usize = 5;
const PT_TO_MM: f32 = 0.3528;

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn rgb(r: u8, g: u8, b: u8) -> Color {
    Color::Rgb(Rgb::new(
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
        None,
    ))
}

fn pdf_error(e: impl std::fmt::Debug) -> ExportError {
    ExportError::Pdf(format!("{e:?}"))
}

/// Rough Helvetica width: half an em per character.
fn text_width_mm(text: &str, size_pt: f32) -> f32 {
    text.chars().count() as f32 * size_pt * 0.5 * PT_TO_MM
}

fn centered(layer: &PdfLayerReference, text: &str, size_pt: f32, y: f32, font: &IndirectFontRef) {
    let x = (PAGE_W - text_width_mm(text, size_pt)) / 2.0;
    layer.use_text(text, size_pt, Mm(x.max(MARGIN)), Mm(y), font);
}

fn filled_rect(layer: &PdfLayerReference, x1: f32, y1: f32, x2: f32, y2: f32, color: Color) {
    layer.set_fill_color(color);
    layer.add_rect(Rect::new(Mm(x1), Mm(y1), Mm(x2), Mm(y2)).with_mode(PaintMode::Fill));
}

/// Greedy word wrap by character count. Words longer than a line are split.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(max_chars).collect();
            word = word.chars().skip(max_chars).collect();
            lines.push(head);
        }
        let separator = usize::from(!current.is_empty());
        let needed = current.chars().count() + separator + word.chars().count();
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn draw_card_border(layer: &PdfLayerReference) {
    layer.set_outline_color(rgb(203, 213, 225));
    layer.set_outline_thickness(1.0);
    layer.add_rect(
        Rect::new(Mm(MARGIN), Mm(MARGIN), Mm(PAGE_W - MARGIN), Mm(PAGE_H - MARGIN))
            .with_mode(PaintMode::Stroke),
    );
}

fn draw_image(layer: &PdfLayerReference, slot: &ImageSlot, fonts: &Fonts, top: f32) {
    let x = (PAGE_W - IMAGE_W) / 2.0;
    let bottom = top - IMAGE_H;

    let placeholder = match slot {
        ImageSlot::Loaded(img) => {
            // printpdf cannot embed alpha channels reliably.
            let rgb_image = DynamicImage::ImageRgb8(img.to_rgb8());
            let natural_w = rgb_image.width() as f32 * 25.4 / IMAGE_DPI;
            let natural_h = rgb_image.height() as f32 * 25.4 / IMAGE_DPI;
            if natural_w > 0.0 && natural_h > 0.0 {
                Image::from_dynamic_image(&rgb_image).add_to_layer(
                    layer.clone(),
                    ImageTransform {
                        translate_x: Some(Mm(x)),
                        translate_y: Some(Mm(bottom)),
                        scale_x: Some(IMAGE_W / natural_w),
                        scale_y: Some(IMAGE_H / natural_h),
                        dpi: Some(IMAGE_DPI),
                        ..Default::default()
                    },
                );
                return;
            }
            "Image not available"
        }
        ImageSlot::Unavailable => "Image not available",
        ImageSlot::Missing => "No image uploaded",
    };

    filled_rect(layer, x, bottom, x + IMAGE_W, top, rgb(241, 245, 249));
    layer.set_fill_color(rgb(100, 116, 139));
    centered(layer, placeholder, 10.0, bottom + IMAGE_H / 2.0, &fonts.regular);
}

fn draw_page(
    layer: &PdfLayerReference,
    fonts: &Fonts,
    record: &ExportRecord,
    slot: &ImageSlot,
    page: usize,
    total: usize,
) {
    draw_card_border(layer);

    // Title banner
    let banner_top = PAGE_H - MARGIN - 5.0;
    filled_rect(
        layer,
        MARGIN + 5.0,
        banner_top - 20.0,
        PAGE_W - MARGIN - 5.0,
        banner_top,
        rgb(79, 70, 229),
    );
    layer.set_fill_color(rgb(255, 255, 255));
    let title = wrap_text(&record.title, 55).into_iter().next().unwrap_or_default();
    centered(layer, &title, 16.0, banner_top - 13.0, &fonts.bold);

    let image_top = banner_top - 30.0;
    draw_image(layer, slot, fonts, image_top);

    let mut y = image_top - IMAGE_H - 12.0;
    layer.set_fill_color(rgb(30, 41, 59));
    let roll_no = if record.roll_no.is_empty() {
        dates::NOT_AVAILABLE
    } else {
        record.roll_no.as_str()
    };
    centered(
        layer,
        &format!("Name: {} | Roll No: {}", record.name, roll_no),
        11.0,
        y,
        &fonts.bold,
    );
    y -= 8.0;
    centered(layer, &format!("Year: {}", record.academic_year), 11.0, y, &fonts.bold);

    if !record.description.trim().is_empty() {
        y -= 12.0;
        layer.use_text("Description:", 11.0, Mm(MARGIN + 20.0), Mm(y), &fonts.bold);
        for line in wrap_text(&record.description, 80)
            .iter()
            .take(MAX_DESCRIPTION_LINES)
        {
            y -= 5.5;
            layer.use_text(line.as_str(), 10.0, Mm(MARGIN + 20.0), Mm(y), &fonts.regular);
        }
    }

    // Stamp
    let stamp_right = PAGE_W - MARGIN - 4.0;
    filled_rect(
        layer,
        stamp_right - 24.0,
        MARGIN + 4.0,
        stamp_right,
        MARGIN + 12.0,
        rgb(22, 163, 74),
    );
    layer.set_fill_color(rgb(255, 255, 255));
    layer.use_text("APPROVED", 7.0, Mm(stamp_right - 20.5), Mm(MARGIN + 6.8), &fonts.bold);

    layer.set_fill_color(rgb(100, 116, 139));
    centered(layer, &format!("Page {page} of {total}"), 8.0, MARGIN / 2.0, &fonts.regular);
}

fn new_page(doc: &PdfDocumentReference, index: usize) -> PdfLayerReference {
    let (page, layer) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), format!("Page {}", index + 1));
    doc.get_page(page).get_layer(layer)
}

/// render_pdf
///
/// One A4 page per record, in the given order. With no records the document
/// still has a single page saying so.
pub fn render_pdf(records: &[ExportRecord], images: &[ImageSlot]) -> Result<Vec<u8>, ExportError> {
    let (doc, first_page, first_layer) =
        PdfDocument::new("Achievements Report", Mm(PAGE_W), Mm(PAGE_H), "Page 1");
    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_error)?,
    };
    let first = doc.get_page(first_page).get_layer(first_layer);

    if records.is_empty() {
        draw_empty_notice(&first, &fonts);
    }

    let total = records.len();
    let missing = ImageSlot::Missing;
    for (index, record) in records.iter().enumerate() {
        let layer = if index == 0 {
            first.clone()
        } else {
            new_page(&doc, index)
        };
        let slot = images.get(index).unwrap_or(&missing);
        draw_page(&layer, &fonts, record, slot, index + 1, total);
    }

    doc.save_to_bytes().map_err(pdf_error)
}

fn draw_empty_notice(layer: &PdfLayerReference, fonts: &Fonts) {
    draw_card_border(layer);
    layer.set_fill_color(rgb(100, 116, 139));
    centered(layer, "No approved achievements to export", 12.0, PAGE_H / 2.0, &fonts.regular);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str) -> ExportRecord {
        ExportRecord {
            name: "Asha".to_string(),
            roll_no: "21A91A0501".to_string(),
            achievement_type: "Sports".to_string(),
            title: title.to_string(),
            description: "Won the inter-college chess tournament ".repeat(20),
            academic_year: "2023-2024".to_string(),
            certificate_issued_date: "2024-03-15".to_string(),
            submitted_by: "student".to_string(),
        }
    }

    #[test]
    fn test_empty_export_is_a_valid_pdf() {
        let bytes = render_pdf(&[], &[]).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_one_page_per_record() {
        let records = vec![record("Chess"), record("Debate")];
        let images = vec![ImageSlot::Missing, ImageSlot::Unavailable];
        let bytes = render_pdf(&records, &images).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        let single = render_pdf(&records[..1], &images[..1]).unwrap();
        assert!(bytes.len() > single.len());
    }

    #[test]
    fn test_loaded_images_are_embedded() {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_fn(64, 64, |x, y| {
            image::Rgba([(x * 4) as u8, (y * 4) as u8, (x * y) as u8, 255])
        }));
        let with_image = render_pdf(&[record("Chess")], &[ImageSlot::Loaded(img)]).unwrap();
        let without = render_pdf(&[record("Chess")], &[ImageSlot::Missing]).unwrap();
        assert!(with_image.len() > without.len());
    }

    #[test]
    fn test_wrap_text() {
        let lines = wrap_text("the quick brown fox jumps over the lazy dog", 10);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
        assert_eq!(lines.join(" "), "the quick brown fox jumps over the lazy dog");

        let long = wrap_text("abcdefghijklmnop", 5);
        assert_eq!(long, vec!["abcde", "fghij", "klmno", "p"]);
        assert!(wrap_text("   ", 10).is_empty());
    }
}
