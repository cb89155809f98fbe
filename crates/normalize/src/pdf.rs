//! Single-page PDF rendering of a decoded raster image.

use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use serde::Serialize;

/// Page orientation of a rendered image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    /// Landscape only when strictly wider than tall.
    pub fn of(width: u32, height: u32) -> Self {
        if width > height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }
}

/// Write `img` as the only page of a new PDF, one point per pixel.
pub(crate) fn image_to_pdf(img: &RgbImage) -> lopdf::Result<Vec<u8>> {
    let (w, h) = (i64::from(img.width()), i64::from(img.height()));

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => w,
            "Height" => h,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        img.as_raw().clone(),
    );
    image.compress()?;
    let image_id = doc.add_object(image);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![w.into(), 0.into(), 0.into(), h.into(), 0.into(), 0.into()],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
        "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orientation_prefers_portrait_for_squares() {
        assert_eq!(Orientation::of(800, 600), Orientation::Landscape);
        assert_eq!(Orientation::of(600, 800), Orientation::Portrait);
        assert_eq!(Orientation::of(500, 500), Orientation::Portrait);
    }

    #[test]
    fn page_matches_pixel_dimensions() {
        let img = RgbImage::from_pixel(40, 30, image::Rgb([200, 10, 10]));
        let bytes = image_to_pdf(&img).unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);

        let page_id = *pages.values().next().unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
        let dims: Vec<i64> = media_box.iter().map(|o| o.as_i64().unwrap()).collect();
        assert_eq!(dims, vec![0, 0, 40, 30]);
    }
}
