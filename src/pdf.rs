use std::path::{Path, PathBuf};

use anyhow::Context as _;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

/// Bundle cached JPEG files into one PDF, one page per image, each page sized
/// to the image's pixel dimensions.
pub fn write_group_pdf(image_paths: &[PathBuf], out_path: &Path) -> anyhow::Result<()> {
    if image_paths.is_empty() {
        anyhow::bail!("group has no images to bundle");
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids: Vec<Object> = Vec::with_capacity(image_paths.len());
    for path in image_paths {
        let page_id = add_image_page(&mut doc, pages_id, path)
            .with_context(|| format!("add page for image: {}", path.display()))?;
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(out_path)
        .with_context(|| format!("write pdf: {}", out_path.display()))?;
    Ok(())
}

fn add_image_page(
    doc: &mut Document,
    pages_id: lopdf::ObjectId,
    path: &Path,
) -> anyhow::Result<lopdf::ObjectId> {
    let bytes = std::fs::read(path).context("read cached image")?;
    let (width, height) = image::image_dimensions(path).context("read image dimensions")?;

    // The cache stores JPEG, so the bytes embed directly as DCT data.
    let image_stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        bytes,
    )
    .with_compression(false);
    let image_id = doc.add_object(image_stream);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Integer(width as i64),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(height as i64),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().context("encode page content")?,
    ));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(width as i64),
            Object::Integer(height as i64),
        ],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });

    Ok(page_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_cache::PLACEHOLDER_JPEG;

    #[test]
    fn one_page_per_image_sized_to_the_image() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let first = dir.path().join("a.jpg");
        let second = dir.path().join("b.jpg");
        std::fs::write(&first, PLACEHOLDER_JPEG)?;
        std::fs::write(&second, PLACEHOLDER_JPEG)?;

        let out = dir.path().join("out.pdf");
        write_group_pdf(&[first.clone(), second], &out)?;

        let doc = Document::load(&out)?;
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);

        let (width, height) = image::image_dimensions(&first)?;
        let first_page = *pages.values().next().expect("first page id");
        let media_box = doc
            .get_object(first_page)?
            .as_dict()?
            .get(b"MediaBox")?
            .as_array()?
            .iter()
            .map(|obj| obj.as_i64())
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(media_box, vec![0, 0, width as i64, height as i64]);
        Ok(())
    }

    #[test]
    fn empty_group_is_rejected() {
        let err = write_group_pdf(&[], Path::new("unused.pdf")).unwrap_err();
        assert!(err.to_string().contains("no images"));
    }
}
