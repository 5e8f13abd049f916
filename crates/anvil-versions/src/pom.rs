//! Minimal `pom.xml` reader.

use anvil_core::{Error, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fmt::Display;

/// Text of the top-level `<version>` child of `<project>`, if present.
///
/// Versions inherited from `<parent>` or declared on dependencies are
/// ignored. Comments and processing instructions never match.
pub fn project_version(xml: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(start) => path.push(start.local_name().as_ref().to_vec()),
            Event::Text(t) if at_project_version(&path) => {
                text.push_str(&t.unescape().map_err(malformed)?);
            }
            Event::CData(data) if at_project_version(&path) => {
                text.push_str(&String::from_utf8_lossy(&data.into_inner()));
            }
            Event::End(_) => {
                if at_project_version(&path) {
                    let version = text.trim();
                    return Ok((!version.is_empty()).then(|| version.to_string()));
                }
                path.pop();
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn at_project_version(path: &[Vec<u8>]) -> bool {
    matches!(path, [project, version] if project.as_slice() == b"project" && version.as_slice() == b"version")
}

fn malformed(err: impl Display) -> Error {
    Error::Serialization(format!("Malformed pom.xml: {}", err))
}
