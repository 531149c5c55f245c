use std::{fs::File, io::{BufRead, BufReader, BufWriter, Read, Write}, path::Path};

use log::debug;

use crate::error::{Error, Result};

/// Open a file, possibly compressed. Supports gzip and zstd.
pub fn open_file_for_read<P: AsRef<Path>>(file: P) -> Result<Box<dyn Read + Send>> {
    let path = file.as_ref();
    let open = || File::open(path).map_err(|e| Error::resource(e, path));
    let reader: Box<dyn Read + Send> = match detect_compression(path)? {
        Some(Compression::Gzip) => Box::new(flate2::read::MultiGzDecoder::new(open()?)),
        Some(Compression::Zstd) => Box::new(zstd::stream::read::Decoder::new(open()?)?),
        None => Box::new(open()?),
    };
    Ok(reader)
}

/// Iterate over the data lines of a tab-separated text file, skipping `#`
/// comments and blank lines.
pub fn read_data_lines<P: AsRef<Path>>(file: P) -> Result<impl Iterator<Item = Result<String>>> {
    let reader = BufReader::new(open_file_for_read(file)?);
    Ok(reader.lines().filter_map(|line| match line {
        Ok(line) if line.is_empty() || line.starts_with('#') => None,
        Ok(line) => Some(Ok(line)),
        Err(e) => Some(Err(e.into())),
    }))
}

/// Records parsed lazily from the data lines of a file.
///
/// Rows the parser rejects with a recoverable error are skipped and counted.
/// Any other failure ends the iteration and is returned by [`ParsedRows::finish`].
pub struct ParsedRows<T> {
    lines: Box<dyn Iterator<Item = Result<String>> + Send>,
    parse: fn(&str) -> Result<T>,
    skipped: u64,
    failure: Option<Error>,
}

pub fn parse_data_lines<T, P: AsRef<Path>>(
    file: P,
    parse: fn(&str) -> Result<T>,
) -> Result<ParsedRows<T>> {
    Ok(ParsedRows {
        lines: Box::new(read_data_lines(file.as_ref().to_path_buf())?),
        parse,
        skipped: 0,
        failure: None,
    })
}

impl<T> ParsedRows<T> {
    /// The number of skipped rows, or the error that stopped the iteration.
    pub fn finish(self) -> Result<u64> {
        match self.failure {
            Some(e) => Err(e),
            None => Ok(self.skipped),
        }
    }
}

impl<T> Iterator for ParsedRows<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.failure.is_some() {
            return None;
        }
        loop {
            let parsed = self.lines.next()?.and_then(|line| (self.parse)(&line));
            match parsed {
                Ok(x) => return Some(x),
                Err(e) if e.is_recoverable() => {
                    debug!("skipping row: {}", e);
                    self.skipped += 1;
                }
                Err(e) => {
                    self.failure = Some(e);
                    return None;
                }
            }
        }
    }
}

/// Determine the file compression type. Supports gzip and zstd.
fn detect_compression<P: AsRef<Path>>(file: P) -> Result<Option<Compression>> {
    let path = file.as_ref();
    let f = File::open(path).map_err(|e| Error::resource(e, path))?;
    if flate2::read::MultiGzDecoder::new(f).header().is_some() {
        Ok(Some(Compression::Gzip))
    } else if path.extension().is_some_and(|ext| ext == "zst") {
        Ok(Some(Compression::Zstd))
    } else {
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Zstd,
}

pub fn open_file_for_write<P: AsRef<Path>>(
    filename: P,
    compression: Option<Compression>,
    compression_level: Option<u32>,
    num_threads: u32,
) -> Result<Box<dyn Write + Send>> {
    let path = filename.as_ref();
    let buffer = BufWriter::new(File::create(path).map_err(|e| Error::resource(e, path))?);
    let writer: Box<dyn Write + Send> = match compression {
        None => Box::new(buffer),
        Some(Compression::Gzip) => {
            let level = flate2::Compression::new(compression_level.unwrap_or(6));
            Box::new(flate2::write::GzEncoder::new(buffer, level))
        }
        Some(Compression::Zstd) => {
            let level = compression_level.unwrap_or(9) as i32;
            let mut zstd = zstd::stream::Encoder::new(buffer, level)?;
            zstd.multithread(num_threads)?;
            Box::new(zstd.auto_finish())
        },
    };
    Ok(writer)
}
