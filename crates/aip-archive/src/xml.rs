//! Thin wrapper over `quick_xml::Writer`
//!
//! Maps writer failures to [`ArchiveError::Xml`] tagged with the file being
//! written, so index and table writers can use `?` throughout.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, IoContext, Result};

pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

pub struct XmlWriter<W: Write> {
    writer: Writer<W>,
    path: PathBuf,
}

impl XmlWriter<BufWriter<File>> {
    /// Create (or truncate) `path` and write the XML declaration
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).at(path)?;
        let mut xml = Self::wrap(BufWriter::new(file), path, true);
        xml.declaration()?;
        Ok(xml)
    }

    /// Flush and close the file
    pub fn finish(self) -> Result<()> {
        let path = self.path;
        let mut inner = self.writer.into_inner();
        inner.write_all(b"\n").at(&path)?;
        inner.flush().at(&path)?;
        Ok(())
    }
}

impl<W: Write> XmlWriter<W> {
    /// Wrap an already positioned writer, optionally indenting two spaces
    pub fn wrap(inner: W, path: &Path, indent: bool) -> Self {
        let writer = if indent {
            Writer::new_with_indent(inner, b' ', 2)
        } else {
            Writer::new(inner)
        };
        Self {
            writer,
            path: path.to_path_buf(),
        }
    }

    /// Raw line break, for unindented output
    pub fn newline(&mut self) -> Result<()> {
        self.writer.get_mut().write_all(b"\n").at(&self.path)
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| ArchiveError::xml(&self.path, e))
    }

    pub fn declaration(&mut self) -> Result<()> {
        self.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
    }

    pub fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let start = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.event(Event::Start(start))
    }

    pub fn end(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    pub fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let empty = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.event(Event::Empty(empty))
    }

    /// `<name>text</name>`, text escaped
    pub fn leaf(&mut self, name: &str, text: &str) -> Result<()> {
        self.start(name, &[])?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }
}
