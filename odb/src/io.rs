//! IO utilities.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{with_err_context, ErrorContext, Result};

pub fn create_file(path: impl AsRef<Path>) -> Result<BufWriter<File>> {
    let path = path.as_ref();
    let file = with_err_context(File::create(path), || {
        ErrorContext::CreateFile(path.to_path_buf())
    })?;
    Ok(BufWriter::new(file))
}

pub fn open_file(path: impl AsRef<Path>) -> Result<BufReader<File>> {
    let path = path.as_ref();
    let file = with_err_context(File::open(path), || {
        ErrorContext::ReadFile(path.to_path_buf())
    })?;
    Ok(BufReader::new(file))
}

pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let data = with_err_context(std::fs::read_to_string(path), || {
        ErrorContext::ReadFile(path.to_path_buf())
    })?;
    Ok(data)
}
