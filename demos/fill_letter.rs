//! Build a tiny DOCX with a fragmented placeholder, fill it, and show the result.
//!
//! Run with: cargo run --example fill_letter

use docx_splice::{container, ArchiveEntry, Decoder, Encoder};

fn main() -> anyhow::Result<()> {
    let xml = concat!(
        r#"<w:document><w:body><w:p>"#,
        r#"<w:r><w:t>Dear </w:t></w:r><w:r><w:t>{</w:t></w:r>"#,
        r#"<w:r><w:t>MemFirstName</w:t></w:r><w:r><w:t>},</w:t></w:r>"#,
        r#"</w:p></w:body></w:document>"#,
    );
    let entries = vec![
        ArchiveEntry::new("[Content_Types].xml", "<Types/>"),
        ArchiveEntry::new("word/document.xml", xml),
    ];

    let encoder = Encoder::new();
    let mut document = encoder.extract(&entries);
    println!("{}", encoder.encode(&document)?);

    document
        .edits
        .set("word/document.xml", "{MemFirstName}", "Aditya");
    let rebuilt = Decoder::new().reconstruct(&document)?;
    println!("replaced {} placeholder(s)", rebuilt.report.applied);

    let bytes = container::to_bytes(&rebuilt.entries)?;
    println!("archive is {} bytes", bytes.len());
    println!("{}", String::from_utf8_lossy(&rebuilt.entries[1].data));

    Ok(())
}
