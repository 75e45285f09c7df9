//! Archive codec
//!
//! Archives are tar containers whose entry bodies are sealed envelopes
//! (zstd-compressed, optionally encrypted; see [`envelope`]). Single-entry
//! archives carry one encrypted attachment; multi-entry archives carry a full
//! repository backup. One container format across all encryption modes, so a
//! reader holding the correct password never needs to know the mode up front.
//!
//! # Design Principles
//!
//! - Header inspection (`is_encrypted`) never requires the password
//! - Credential probing (`test_decrypt`) never exposes plaintext
//! - Wrong password, absent entry, and corrupt data stay distinguishable

pub mod envelope;
pub mod errors;

pub use envelope::{open as open_envelope, seal_encrypted, seal_plain, EncryptionMode};
pub use errors::{ArchiveError, ArchiveResult};

use std::io::{Read, Write};

/// Streaming writer for multi-entry archives.
pub struct ArchiveWriter<W: Write> {
    builder: tar::Builder<W>,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            builder: tar::Builder::new(sink),
        }
    }

    /// Append an entry sealed without encryption.
    pub fn append_plain(&mut self, name: &str, plaintext: &[u8]) -> ArchiveResult<()> {
        let sealed = envelope::seal_plain(plaintext)?;
        self.append_raw(name, &sealed)
    }

    /// Append an entry sealed under a password.
    pub fn append_encrypted(
        &mut self,
        name: &str,
        password: &str,
        mode: EncryptionMode,
        plaintext: &[u8],
    ) -> ArchiveResult<()> {
        let sealed = envelope::seal_encrypted(plaintext, password, mode)?;
        self.append_raw(name, &sealed)
    }

    /// Append an already-sealed envelope verbatim.
    pub fn append_raw(&mut self, name: &str, sealed: &[u8]) -> ArchiveResult<()> {
        let mut header = tar::Header::new_gnu();
        header.set_size(sealed.len() as u64);
        header.set_mode(0o644);
        self.builder
            .append_data(&mut header, name, sealed)
            .map_err(ArchiveError::Io)
    }

    /// Finish the archive and return the sink.
    pub fn finish(self) -> ArchiveResult<W> {
        self.builder.into_inner().map_err(ArchiveError::Io)
    }
}

/// Streaming reader for multi-entry archives.
pub struct ArchiveReader<R: Read> {
    archive: tar::Archive<R>,
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            archive: tar::Archive::new(source),
        }
    }

    /// Visit every entry in order as (name, sealed envelope bytes).
    pub fn for_each<E, F>(mut self, mut visit: F) -> Result<(), E>
    where
        E: From<ArchiveError>,
        F: FnMut(&str, Vec<u8>) -> Result<(), E>,
    {
        for entry in self.archive.entries().map_err(ArchiveError::Io)? {
            let mut entry = entry.map_err(ArchiveError::Io)?;
            let name = entry
                .path()
                .map_err(ArchiveError::Io)?
                .to_string_lossy()
                .to_string();
            let mut sealed = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut sealed).map_err(ArchiveError::Io)?;
            visit(&name, sealed)?;
        }
        Ok(())
    }

    fn first_entry(mut self) -> ArchiveResult<(String, Vec<u8>)> {
        let mut entries = self.archive.entries().map_err(ArchiveError::Io)?;
        let entry = entries
            .next()
            .ok_or_else(|| ArchiveError::EntryNotFound("<first entry>".into()))?;
        let mut entry = entry.map_err(ArchiveError::Io)?;
        let name = entry
            .path()
            .map_err(ArchiveError::Io)?
            .to_string_lossy()
            .to_string();
        let mut sealed = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut sealed).map_err(ArchiveError::Io)?;
        Ok((name, sealed))
    }
}

/// Encrypt `input` into a single-entry archive written to `output`.
pub fn encrypt(
    entry_name: &str,
    password: &str,
    mode: EncryptionMode,
    input: &mut impl Read,
    output: impl Write,
) -> ArchiveResult<()> {
    let mut plaintext = Vec::new();
    input.read_to_end(&mut plaintext)?;
    let mut writer = ArchiveWriter::new(output);
    writer.append_encrypted(entry_name, password, mode, &plaintext)?;
    writer.finish()?;
    Ok(())
}

/// Whether the archive's first entry is encrypted. Inspects headers only;
/// never needs the password.
pub fn is_encrypted(source: impl Read) -> ArchiveResult<bool> {
    let (_, sealed) = ArchiveReader::new(source).first_entry()?;
    Ok(envelope::parse_header(&sealed)?.is_encrypted())
}

/// Non-destructive credential probe: try to open the first entry with the
/// given password. Plaintext is decoded and discarded, never returned.
pub fn test_decrypt(password: &str, source: impl Read) -> ArchiveResult<bool> {
    let (_, sealed) = ArchiveReader::new(source).first_entry()?;
    match envelope::open(&sealed, Some(password)) {
        Ok(_) => Ok(true),
        Err(ArchiveError::WrongPassword) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Decrypt one named entry from an archive.
pub fn decrypt_entry(
    entry_name: &str,
    password: Option<&str>,
    source: impl Read,
) -> ArchiveResult<Vec<u8>> {
    let mut found = None;
    ArchiveReader::new(source).for_each(|name, sealed| -> ArchiveResult<()> {
        if name == entry_name && found.is_none() {
            found = Some(envelope::open(&sealed, password)?);
        }
        Ok(())
    })?;
    found.ok_or_else(|| ArchiveError::EntryNotFound(entry_name.to_string()))
}
