//! # Field Discipline
//!
//! Typed commands carry their fields in the wire command's ordered string
//! array. `FieldWriter` and `FieldReader` enforce the positional contract at
//! that level: the reader must issue the mirror sequence of reads, and an
//! exhausted array or an unparsable field is a malformed command.
//!
//! Shared base field groups ([`AppRef`], [`WindowRef`]) are plain structs
//! embedded in concrete commands. A command writes its base group first, then
//! its own fields; embedding makes the base-before-derived order a property
//! of the struct layout instead of call discipline.

use crate::error::Error;
use crate::error::Result;
use crate::id::AppId;
use crate::id::IsolateId;
use crate::id::WindowId;

/// Appends typed fields to a command's data section.
#[derive(Debug, Default)]
pub struct FieldWriter {
    data: Vec<String>,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Consumes the writer, yielding the ordered data section.
    pub fn into_data(self) -> Vec<String> {
        self.data
    }

    pub fn str(&mut self, v: &str) {
        self.data.push(v.to_string());
    }

    pub fn i32(&mut self, v: i32) {
        self.data.push(v.to_string());
    }

    pub fn bool(&mut self, v: bool) {
        self.data.push(if v { "1" } else { "0" }.to_string());
    }
}

/// Reads typed fields back out of a command's data section, in order.
pub struct FieldReader<'a> {
    data: &'a [String],
    pos: usize,
    payload: Option<&'a [u8]>,
}

impl<'a> FieldReader<'a> {
    pub fn new(data: &'a [String], payload: Option<&'a [u8]>) -> Self {
        Self { data, pos: 0, payload }
    }

    fn next(&mut self) -> Result<&'a str> {
        let field = self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::Malformed(format!("data exhausted at field {}", self.pos)))?;
        self.pos += 1;
        Ok(field)
    }

    pub fn str(&mut self) -> Result<&'a str> {
        self.next()
    }

    pub fn i32(&mut self) -> Result<i32> {
        let field = self.next()?;
        field
            .parse()
            .map_err(|_| Error::Malformed(format!("expected integer field, got '{}'", field)))
    }

    pub fn bool(&mut self) -> Result<bool> {
        match self.next()? {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(Error::Malformed(format!("expected boolean field, got '{}'", other))),
        }
    }

    /// Takes the command's binary payload.
    pub fn take_payload(&mut self) -> Result<&'a [u8]> {
        self.payload
            .take()
            .ok_or_else(|| Error::Malformed("missing binary payload".into()))
    }
}

/// Base field group naming one application: owning isolate, then app id.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AppRef {
    pub isolate_id: IsolateId,
    pub app_id: AppId,
}

impl AppRef {
    pub fn new(isolate_id: IsolateId, app_id: AppId) -> Self {
        Self { isolate_id, app_id }
    }

    pub fn put(&self, w: &mut FieldWriter) {
        w.i32(self.isolate_id.0);
        w.i32(self.app_id.0);
    }

    pub fn take(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            isolate_id: IsolateId(r.i32()?),
            app_id: AppId(r.i32()?),
        })
    }
}

/// Base field group naming one window: owning isolate, then window id.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WindowRef {
    pub isolate_id: IsolateId,
    pub window_id: WindowId,
}

impl WindowRef {
    pub fn new(isolate_id: IsolateId, window_id: WindowId) -> Self {
        Self { isolate_id, window_id }
    }

    pub fn put(&self, w: &mut FieldWriter) {
        w.i32(self.isolate_id.0);
        w.i32(self.window_id.0);
    }

    pub fn take(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            isolate_id: IsolateId(r.i32()?),
            window_id: WindowId(r.i32()?),
        })
    }
}
