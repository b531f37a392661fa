//! Document loaders for various file formats
//!
//! Supports plain text, Markdown, PDF (`pdf` feature) and DOCX (`docx`
//! feature) documents.

use crate::data::Document;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Trait for loading documents from various sources
pub trait DocumentLoader {
    /// Load a document from the given path
    fn load(&self, path: &Path) -> Result<Document>;

    /// Check if this loader can handle the given file extension
    fn can_load(&self, path: &Path) -> bool;
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Read a UTF-8 file into a document tagged with its file name, type and size
fn load_text_file(path: &Path, file_type: &str) -> Result<Document> {
    let content = fs::read_to_string(path)
        .context(format!("Failed to read {} file: {:?}", file_type, path))?;
    file_document(path, content, file_type)
}

/// Wrap extracted text in a document; empty extractions are an error
fn file_document(path: &Path, content: String, file_type: &str) -> Result<Document> {
    if content.trim().is_empty() {
        anyhow::bail!("No text content found in {:?}", path);
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    let size = content.len() as i64;

    Ok(Document::new(file_name.clone(), content)
        .with_metadata("filename", file_name)
        .with_metadata("source", path.to_string_lossy().to_string())
        .with_metadata("file_type", file_type)
        .with_metadata("size", size))
}

/// Text file loader
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path) -> Result<Document> {
        load_text_file(path, "txt")
    }

    fn can_load(&self, path: &Path) -> bool {
        has_extension(path, &["txt", "text"])
    }
}

/// Markdown file loader
pub struct MarkdownLoader;

impl DocumentLoader for MarkdownLoader {
    fn load(&self, path: &Path) -> Result<Document> {
        load_text_file(path, "md")
    }

    fn can_load(&self, path: &Path) -> bool {
        has_extension(path, &["md", "markdown"])
    }
}

/// PDF file loader
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn load(&self, _path: &Path) -> Result<Document> {
        #[cfg(feature = "pdf")]
        {
            let content = pdf_extract::extract_text(_path)
                .context(format!("Failed to extract text from PDF: {:?}", _path))?;
            file_document(_path, content, "pdf")
        }

        #[cfg(not(feature = "pdf"))]
        {
            anyhow::bail!("PDF support not enabled. Compile with --features pdf")
        }
    }

    fn can_load(&self, path: &Path) -> bool {
        has_extension(path, &["pdf"])
    }
}

/// DOCX file loader
///
/// Reads `word/document.xml` from the archive. Each paragraph becomes one
/// line; tabs and breaks are kept.
pub struct DocxLoader;

impl DocumentLoader for DocxLoader {
    fn load(&self, _path: &Path) -> Result<Document> {
        #[cfg(feature = "docx")]
        {
            use std::io::Read;

            let file = fs::File::open(_path).context(format!("Failed to open DOCX file: {:?}", _path))?;
            let mut archive = zip::ZipArchive::new(file).context(format!("Not a DOCX archive: {:?}", _path))?;
            let mut xml = String::new();
            archive
                .by_name("word/document.xml")
                .context(format!("DOCX has no word/document.xml: {:?}", _path))?
                .read_to_string(&mut xml)?;

            file_document(_path, docx_text(&xml)?, "docx")
        }

        #[cfg(not(feature = "docx"))]
        {
            anyhow::bail!("DOCX support not enabled. Compile with --features docx")
        }
    }

    fn can_load(&self, path: &Path) -> bool {
        has_extension(path, &["docx"])
    }
}

/// Text of a WordprocessingML body
#[cfg(feature = "docx")]
fn docx_text(xml: &str) -> Result<String> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_run_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_run_text => text.push_str(&t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(text.trim_end().to_string())
}

/// Multi-format document loader that delegates to specific loaders
pub struct MultiFormatLoader {
    loaders: Vec<Box<dyn DocumentLoader>>,
    /// Files larger than this are skipped
    max_file_size: u64,
}

/// Result of loading a directory: documents plus files that could not be read
#[derive(Default)]
pub struct LoadedDirectory {
    pub documents: Vec<Document>,
    pub failures: Vec<(String, String)>,
}

impl MultiFormatLoader {
    /// Create a new multi-format loader with all supported loaders
    pub fn new() -> Self {
        let loaders: Vec<Box<dyn DocumentLoader>> = vec![
            Box::new(TextLoader),
            Box::new(MarkdownLoader),
            Box::new(PdfLoader),
            Box::new(DocxLoader),
        ];

        Self {
            loaders,
            max_file_size: 10 * 1024 * 1024,
        }
    }

    /// Set the size limit for loaded files
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Whether any loader handles this file
    pub fn supports(&self, path: &Path) -> bool {
        self.loaders.iter().any(|l| l.can_load(path))
    }

    /// Load a document, automatically selecting the appropriate loader
    pub fn load(&self, path: &Path) -> Result<Document> {
        let size = fs::metadata(path)
            .context(format!("Failed to stat {:?}", path))?
            .len();
        if size > self.max_file_size {
            anyhow::bail!(
                "File too large: {:?} is {} bytes (limit {})",
                path,
                size,
                self.max_file_size
            );
        }

        for loader in &self.loaders {
            if loader.can_load(path) {
                return loader.load(path);
            }
        }

        anyhow::bail!("Unsupported file type: {:?}", path)
    }

    /// Load all supported documents under a directory recursively
    ///
    /// Document ids are paths relative to `dir_path`, so identically named
    /// files in different subdirectories stay distinct.
    pub fn load_directory(&self, dir_path: &Path) -> Result<LoadedDirectory> {
        let mut loaded = LoadedDirectory::default();
        self.walk(dir_path, dir_path, &mut loaded)?;
        loaded.documents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(loaded)
    }

    fn walk(&self, root: &Path, dir: &Path, loaded: &mut LoadedDirectory) -> Result<()> {
        for entry in fs::read_dir(dir).context(format!("Failed to read directory: {:?}", dir))? {
            let path = entry?.path();

            if path.is_dir() {
                self.walk(root, &path, loaded)?;
                continue;
            }
            if !path.is_file() || !self.supports(&path) {
                continue;
            }

            let id = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            match self.load(&path) {
                Ok(mut doc) => {
                    doc.id = id;
                    loaded.documents.push(doc);
                }
                Err(e) => {
                    tracing::warn!("Failed to load file {:?}: {:#}", path, e);
                    loaded.failures.push((id, format!("{:#}", e)));
                }
            }
        }
        Ok(())
    }
}

impl Default for MultiFormatLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MetadataValue;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_text_loader() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        writeln!(file, "Hello, world!").unwrap();

        let loader = TextLoader;
        let doc = loader.load(file.path()).unwrap();

        assert!(doc.text.contains("Hello, world!"));
        assert_eq!(doc.metadata["file_type"], MetadataValue::Text("txt".into()));
    }

    #[test]
    fn test_markdown_loader() {
        let mut file = NamedTempFile::with_suffix(".md").unwrap();
        writeln!(file, "# Header\n\nContent").unwrap();

        let loader = MarkdownLoader;
        let doc = loader.load(file.path()).unwrap();

        assert!(doc.text.contains("# Header"));
        assert_eq!(doc.metadata["file_type"], MetadataValue::Text("md".into()));
    }

    #[test]
    fn test_load_directory_uses_relative_ids() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("sky.txt"), "The sky is blue.").unwrap();
        fs::write(dir.path().join("nested/grass.md"), "Grass is green.").unwrap();
        fs::write(dir.path().join("empty.txt"), "  ").unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let loaded = MultiFormatLoader::new().load_directory(dir.path()).unwrap();
        let ids: Vec<&str> = loaded.documents.iter().map(|d| d.id.as_str()).collect();

        assert_eq!(ids, vec!["nested/grass.md", "sky.txt"]);
        assert_eq!(loaded.failures.len(), 1);
        assert_eq!(loaded.failures[0].0, "empty.txt");
    }

    #[test]
    fn test_supported_extensions() {
        let loader = MultiFormatLoader::new();
        for name in ["a.txt", "a.md", "a.pdf", "a.DOCX"] {
            assert!(loader.supports(Path::new(name)), "{}", name);
        }
        assert!(!loader.supports(Path::new("a.png")));
    }

    #[cfg(feature = "docx")]
    fn write_docx(path: &Path, body: &str) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        )
        .unwrap();
        zip.finish().unwrap();
    }

    #[cfg(feature = "docx")]
    #[test]
    fn test_docx_loader() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.docx");
        write_docx(
            &path,
            concat!(
                "<w:p><w:r><w:t>The sky </w:t></w:r><w:r><w:t>is blue.</w:t></w:r></w:p>",
                "<w:p><w:r><w:t>Salt &amp; pepper</w:t><w:tab/><w:t>Grass is green.</w:t></w:r></w:p>"
            ),
        );

        let doc = MultiFormatLoader::new().load(&path).unwrap();

        assert_eq!(doc.id, "report.docx");
        assert_eq!(doc.text, "The sky is blue.\nSalt & pepper\tGrass is green.");
        assert_eq!(doc.metadata["file_type"], MetadataValue::Text("docx".into()));
    }

    #[cfg(feature = "docx")]
    #[test]
    fn test_docx_without_text_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blank.docx");
        write_docx(&path, "<w:p></w:p>");
        fs::write(dir.path().join("broken.docx"), b"not a zip").unwrap();

        let loaded = MultiFormatLoader::new().load_directory(dir.path()).unwrap();
        assert!(loaded.documents.is_empty());
        let ids: Vec<&str> = loaded.failures.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"blank.docx") && ids.contains(&"broken.docx"));
    }

    #[test]
    fn test_size_limit() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        write!(file, "{}", "x".repeat(100)).unwrap();

        let loader = MultiFormatLoader::new().with_max_file_size(10);
        assert!(loader.load(file.path()).is_err());
    }
}
