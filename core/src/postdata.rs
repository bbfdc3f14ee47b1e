//! Post data attached to a request: an ordered list of named elements.
//!
//! # Design
//! Elements are shared handles so a caller can keep one, mutate it and
//! remove it again by identity, the way the C binding hands them out. The
//! model turns into a wire body only through `PostData::encode`, which the
//! transport calls when a task is admitted.
//!
//! A single unnamed text or buffer element is sent as a raw body; anything
//! else becomes `multipart/form-data`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::error::Result;
use crate::lock;

/// The kind of value an element currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PostDataElemType {
    Empty = 0,
    File = 1,
    Buffer = 2,
    Text = 3,
}

/// Value held by a `PostDataElem`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PostDataValue {
    #[default]
    Empty,
    /// Read from disk when the body is encoded.
    File(PathBuf),
    Buffer(Vec<u8>),
    Text(String),
}

#[derive(Debug, Default)]
struct ElemState {
    name: String,
    value: PostDataValue,
}

/// One named field of a post body.
#[derive(Debug, Clone, Default)]
pub struct PostDataElem {
    inner: Arc<Mutex<ElemState>>,
}

impl PartialEq for PostDataElem {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for PostDataElem {}

impl PostDataElem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let elem = Self::new();
        elem.set_name(name);
        elem.set_to_text(text);
        elem
    }

    pub fn buffer(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let elem = Self::new();
        elem.set_name(name);
        elem.set_to_buffer(bytes);
        elem
    }

    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let elem = Self::new();
        elem.set_name(name);
        elem.set_to_file(path);
        elem
    }

    pub fn set_name(&self, name: impl Into<String>) {
        lock(&self.inner).name = name.into();
    }

    pub fn name(&self) -> String {
        lock(&self.inner).name.clone()
    }

    pub fn set_to_empty(&self) {
        lock(&self.inner).value = PostDataValue::Empty;
    }

    pub fn set_to_file(&self, path: impl Into<PathBuf>) {
        lock(&self.inner).value = PostDataValue::File(path.into());
    }

    pub fn set_to_buffer(&self, bytes: impl Into<Vec<u8>>) {
        lock(&self.inner).value = PostDataValue::Buffer(bytes.into());
    }

    pub fn set_to_text(&self, text: impl Into<String>) {
        lock(&self.inner).value = PostDataValue::Text(text.into());
    }

    pub fn elem_type(&self) -> PostDataElemType {
        match lock(&self.inner).value {
            PostDataValue::Empty => PostDataElemType::Empty,
            PostDataValue::File(_) => PostDataElemType::File,
            PostDataValue::Buffer(_) => PostDataElemType::Buffer,
            PostDataValue::Text(_) => PostDataElemType::Text,
        }
    }

    pub fn value(&self) -> PostDataValue {
        lock(&self.inner).value.clone()
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        match &lock(&self.inner).value {
            PostDataValue::File(path) => Some(path.clone()),
            _ => None,
        }
    }

    pub fn text_value(&self) -> Option<String> {
        match &lock(&self.inner).value {
            PostDataValue::Text(text) => Some(text.clone()),
            _ => None,
        }
    }

    /// Size of the buffer value, 0 for any other kind.
    pub fn buffer_size(&self) -> usize {
        match &lock(&self.inner).value {
            PostDataValue::Buffer(bytes) => bytes.len(),
            _ => 0,
        }
    }

    /// Copy as much of the buffer value as fits into `dst`; returns the
    /// number of bytes copied.
    pub fn copy_buffer_to(&self, dst: &mut [u8]) -> usize {
        match &lock(&self.inner).value {
            PostDataValue::Buffer(bytes) => {
                let n = bytes.len().min(dst.len());
                dst[..n].copy_from_slice(&bytes[..n]);
                n
            }
            _ => 0,
        }
    }
}

/// An encoded request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Ordered collection of post-data elements.
#[derive(Debug, Clone, Default)]
pub struct PostData {
    elems: Arc<Mutex<Vec<PostDataElem>>>,
}

impl PartialEq for PostData {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.elems, &other.elems)
    }
}

impl Eq for PostData {}

impl PostData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        lock(&self.elems).clear();
    }

    pub fn add_elem(&self, elem: PostDataElem) {
        lock(&self.elems).push(elem);
    }

    /// Remove `elem` by identity. Returns `true` if it was present.
    pub fn remove_elem(&self, elem: &PostDataElem) -> bool {
        let mut elems = lock(&self.elems);
        match elems.iter().position(|e| e == elem) {
            Some(pos) => {
                elems.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn element(&self, index: usize) -> Option<PostDataElem> {
        lock(&self.elems).get(index).cloned()
    }

    pub fn element_count(&self) -> usize {
        lock(&self.elems).len()
    }

    pub fn elements(&self) -> Vec<PostDataElem> {
        lock(&self.elems).clone()
    }

    /// Encode the elements into a request body.
    pub fn encode(&self) -> Result<Body> {
        let elems = self.elements();
        if let [only] = elems.as_slice() {
            if only.name().is_empty() {
                match only.value() {
                    PostDataValue::Text(text) => {
                        return Ok(Body {
                            content_type: Some("text/plain; charset=utf-8".to_string()),
                            bytes: text.into_bytes(),
                        })
                    }
                    PostDataValue::Buffer(bytes) => {
                        return Ok(Body {
                            content_type: Some("application/octet-stream".to_string()),
                            bytes,
                        })
                    }
                    _ => {}
                }
            }
        }
        if elems.is_empty() {
            return Ok(Body::default());
        }
        let boundary = format!("sinet-{}", Uuid::new_v4().simple());
        encode_multipart(&elems, &boundary)
    }
}

fn encode_multipart(elems: &[PostDataElem], boundary: &str) -> Result<Body> {
    let mut out = Vec::new();
    for elem in elems {
        let name = escape_quoted(&elem.name());
        out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match elem.value() {
            PostDataValue::Empty => {
                out.extend_from_slice(disposition(&name, None).as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            PostDataValue::Text(text) => {
                out.extend_from_slice(disposition(&name, None).as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(text.as_bytes());
            }
            PostDataValue::Buffer(bytes) => {
                out.extend_from_slice(disposition(&name, None).as_bytes());
                out.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
                out.extend_from_slice(&bytes);
            }
            PostDataValue::File(path) => {
                let contents = std::fs::read(&path)?;
                let filename = escape_quoted(&file_name(&path));
                out.extend_from_slice(disposition(&name, Some(&filename)).as_bytes());
                out.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
                out.extend_from_slice(&contents);
            }
        }
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    Ok(Body {
        content_type: Some(format!("multipart/form-data; boundary={boundary}")),
        bytes: out,
    })
}

fn disposition(name: &str, filename: Option<&str>) -> String {
    match filename {
        Some(filename) => {
            format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n")
        }
        None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n"),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn escape_quoted(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
