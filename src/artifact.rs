//! Generated artifacts: C key headers and the tag test-vector file.
//!
//! Rendering is pure and returns strings; persistence goes through an
//! [`ArtifactSink`] so callers decide where (or whether) files land.

use std::collections::BTreeMap;
use std::fs::{create_dir_all, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::cipher::BlockCipher;
use crate::kdf::Kdf;
use crate::subkeys::{SubkeySet, TagLength};
use crate::DeriveError;

/// Subkeys only, one initializer per tag length.
pub const KEY_HEADER_NAME: &str = "uhash_vec_keys.h";
/// Subkeys with attribute pointers, followed by the pads.
pub const VECTOR_HEADER_NAME: &str = "umac_vec_keys.h";
/// Expected tags for the message fixtures.
pub const TEST_VECTOR_NAME: &str = "umac_test_vec.txt";

const HEADER_PREAMBLE: &str = "#include \"umac.h\"\n\n";

/// Errors raised while producing artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error(transparent)]
    /// A derivation input was rejected.
    Derive(#[from] DeriveError),
    #[error("failed to write artifact: {0}")]
    /// The sink failed.
    Io(#[from] io::Error),
    #[error("hash for {tag_bits}-bit tag returned {actual} bytes")]
    /// The injected hash returned a tag of the wrong width.
    HashLength {
        /// Tag length that was requested.
        tag_bits: u32,
        /// Number of bytes returned.
        actual: usize,
    },
}

/// Destination for named text artifacts.
pub trait ArtifactSink {
    /// Stores `contents` under `name`, replacing anything already there.
    fn write_artifact(&mut self, name: &str, contents: &str) -> io::Result<()>;
}

/// Writes artifacts as files under one directory, creating it on demand.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Targets `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Path an artifact called `name` is written to.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl ArtifactSink for DirectorySink {
    fn write_artifact(&mut self, name: &str, contents: &str) -> io::Result<()> {
        create_dir_all(&self.dir)?;
        let path = self.path_of(name);
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(contents.as_bytes())?;
        writer.flush()?;
        info!(path = %path.display(), bytes = contents.len(), "wrote artifact");
        Ok(())
    }
}

/// Keeps artifacts in memory, ordered by name.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    files: BTreeMap<String, String>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the artifact stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    /// Names of all stored artifacts.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

impl ArtifactSink for MemorySink {
    fn write_artifact(&mut self, name: &str, contents: &str) -> io::Result<()> {
        self.files.insert(name.to_string(), contents.to_string());
        Ok(())
    }
}

fn push_key_initializer(out: &mut String, keys: &SubkeySet, with_attributes: bool) {
    let bits = keys.tag().bits();
    out.push_str(&format!("uhash_{bits}_key key_{bits} = {{\n"));
    if with_attributes {
        out.push_str(&format!("&uhash_{bits}_attributes,\n"));
    }
    out.push_str("{\n");
    for word in &keys.l1 {
        out.push_str(&format!("0x{word:08X}u,\n"));
    }
    out.push_str("},\n{\n");
    for l2 in &keys.l2 {
        out.push_str(&format!(
            "{{0x{:016X}u, {{ {{0x{:016X}u, 0x{:016X}u }} }} }}, \n",
            l2.k64, l2.k128[0], l2.k128[1]
        ));
    }
    out.push_str("},\n{\n");
    for value in &keys.l3a {
        out.push_str(&format!("0x{value:08X}u,\n"));
    }
    out.push_str("},\n{\n");
    for word in &keys.l3b {
        out.push_str(&format!("0x{word:08X}u,\n"));
    }
    out.push_str("}};\n\n");
}

/// Renders the standalone subkey header for the given sets.
pub fn render_key_header(sets: &[SubkeySet]) -> String {
    let mut out = String::from(HEADER_PREAMBLE);
    for keys in sets {
        push_key_initializer(&mut out, keys, false);
    }
    out
}

/// Renders the combined header: subkeys for every tag length, then the
/// pads for `nonce` and the `pads` index.
///
/// The output has no trailing newline.
///
/// # Errors
///
/// Propagates [`DeriveError`] from subkey or pad derivation.
pub fn render_vector_header<C: BlockCipher>(
    kdf: &Kdf<C>,
    nonce: &[u8],
) -> Result<String, DeriveError> {
    let mut out = String::from(HEADER_PREAMBLE);
    for keys in kdf.subkeys_all()? {
        push_key_initializer(&mut out, &keys, true);
    }
    for tag in TagLength::ALL {
        let pad = kdf.pad(nonce, tag)?;
        out.push_str(&format!(
            "uint32_t pad{}[{}] = {{\n",
            tag.bits(),
            tag.iters()
        ));
        for chunk in pad.chunks(4) {
            out.push_str(&format!("0x{}u,\n", hex::encode_upper(chunk)));
        }
        out.push_str("};\n\n");
    }
    out.push_str("uint32_t *pads[4] = {pad32, pad64, pad96, pad128};");
    Ok(out)
}

/// A named message used for the tag test vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageFixture {
    /// Label written after `Message: `.
    pub name: &'static str,
    /// Repeated unit.
    pub unit: &'static [u8],
    /// Number of repetitions.
    pub repeat: usize,
}

impl MessageFixture {
    /// Materializes the message.
    pub fn message(&self) -> Vec<u8> {
        self.unit.repeat(self.repeat)
    }
}

/// The fixed message set, in output order.
pub const MESSAGE_FIXTURES: [MessageFixture; 8] = [
    MessageFixture { name: "<empty>", unit: b"", repeat: 0 },
    MessageFixture { name: "'a' * 3", unit: b"a", repeat: 3 },
    MessageFixture { name: "'a' * 2^10", unit: b"a", repeat: 1 << 10 },
    MessageFixture { name: "'a' * 2^15", unit: b"a", repeat: 1 << 15 },
    MessageFixture { name: "'a' * 2^20", unit: b"a", repeat: 1 << 20 },
    MessageFixture { name: "'a' * 2^25", unit: b"a", repeat: 1 << 25 },
    MessageFixture { name: "'abc' * 1", unit: b"abc", repeat: 1 },
    MessageFixture { name: "'abc' * 500", unit: b"abc", repeat: 500 },
];

/// The universal hash cascade a tag is built on.
///
/// Implementations return exactly `keys.tag().bytes()` bytes; the tag is
/// that output XOR the pad.
pub trait UniversalHash {
    /// Hashes `message` under `keys`.
    fn hash(&self, keys: &SubkeySet, message: &[u8]) -> Vec<u8>;
}

/// Renders the tag test-vector file for `nonce`.
///
/// # Errors
///
/// Returns [`ArtifactError::HashLength`] if `hash` returns the wrong width,
/// or the derivation error for a bad key or nonce.
pub fn render_test_vectors<C, H>(kdf: &Kdf<C>, nonce: &[u8], hash: &H) -> Result<String, ArtifactError>
where
    C: BlockCipher,
    H: UniversalHash + ?Sized,
{
    let sets = kdf.subkeys_all()?;
    let pads = TagLength::ALL
        .iter()
        .map(|&tag| kdf.pad(nonce, tag))
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = String::new();
    for fixture in &MESSAGE_FIXTURES {
        let message = fixture.message();
        out.push_str(&format!("Message: {}\n", fixture.name));
        for (keys, pad) in sets.iter().zip(&pads) {
            let digest = hash.hash(keys, &message);
            if digest.len() != pad.len() {
                return Err(ArtifactError::HashLength {
                    tag_bits: keys.tag().bits(),
                    actual: digest.len(),
                });
            }
            let tag: Vec<u8> = digest.iter().zip(pad).map(|(h, p)| h ^ p).collect();
            out.push_str(&format!(
                "{}:{}\n",
                keys.tag().bits(),
                hex::encode_upper(tag)
            ));
        }
    }
    Ok(out)
}

/// Renders and stores both headers, plus the test vectors when a hash is
/// supplied.  Returns the names written, in order.
///
/// # Errors
///
/// Propagates derivation failures and sink I/O errors.
pub fn write_artifacts<C, S>(
    kdf: &Kdf<C>,
    nonce: &[u8],
    sink: &mut S,
    hash: Option<&dyn UniversalHash>,
) -> Result<Vec<&'static str>, ArtifactError>
where
    C: BlockCipher,
    S: ArtifactSink + ?Sized,
{
    let mut written = Vec::new();
    let sets = kdf.subkeys_all()?;
    sink.write_artifact(KEY_HEADER_NAME, &render_key_header(&sets))?;
    written.push(KEY_HEADER_NAME);
    sink.write_artifact(VECTOR_HEADER_NAME, &render_vector_header(kdf, nonce)?)?;
    written.push(VECTOR_HEADER_NAME);
    if let Some(hash) = hash {
        sink.write_artifact(TEST_VECTOR_NAME, &render_test_vectors(kdf, nonce, hash)?)?;
        written.push(TEST_VECTOR_NAME);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    const KEY: &[u8] = b"abcdefghijklmnop";
    const NONCE: &[u8] = b"bcdefghi";

    /// Contributes nothing, so every tag equals its pad.
    struct ZeroHash;

    impl UniversalHash for ZeroHash {
        fn hash(&self, keys: &SubkeySet, _message: &[u8]) -> Vec<u8> {
            vec![0; keys.tag().bytes()]
        }
    }

    struct ShortHash;

    impl UniversalHash for ShortHash {
        fn hash(&self, _keys: &SubkeySet, _message: &[u8]) -> Vec<u8> {
            vec![0; 2]
        }
    }

    fn kdf() -> Kdf {
        Kdf::aes128(KEY).unwrap()
    }

    #[test]
    fn test_key_header_layout() {
        let sets = vec![kdf().subkeys(TagLength::Bits32).unwrap()];
        let header = render_key_header(&sets);
        let lines: Vec<&str> = header.lines().collect();
        assert_eq!(lines[0], "#include \"umac.h\"");
        assert_eq!(lines[2], "uhash_32_key key_32 = {");
        assert_eq!(lines[3], "{");
        assert_eq!(lines[4], "0xACD79B4Fu,");
        assert_eq!(
            lines[4 + 256 + 2],
            "{0x0094B8DD0137BEF8u, { {0x019E34B600406DB9u, 0x00CC8AD900CCA5EEu } } }, "
        );
        assert_eq!(lines[4 + 256 + 5], "0xDF5E037C8u,");
        assert!(header.ends_with("0x2E79F461u,\n}};\n\n"));
        assert!(!header.contains("attributes"));
    }

    #[test]
    fn test_vector_header_pads() {
        let header = render_vector_header(&kdf(), NONCE).unwrap();
        assert!(header.contains("&uhash_128_attributes,\n{\n"));
        assert!(header.contains("uint32_t pad32[1] = {\n0xAE135F82u,\n};\n\n"));
        assert!(header.contains("uint32_t pad64[2] = {\n0xD13745D4u,\n0x304F1842u,\n};"));
        assert!(header.ends_with("};\n\nuint32_t *pads[4] = {pad32, pad64, pad96, pad128};"));
    }

    #[test]
    fn test_vector_header_rejects_bad_nonce() {
        let err = render_vector_header(&kdf(), b"nonce").unwrap_err();
        assert!(matches!(err, DeriveError::NonceLength { tag_bits: 32, .. }));
    }

    #[test]
    fn test_fixture_messages() {
        let lens: Vec<usize> = MESSAGE_FIXTURES.iter().map(|f| f.message().len()).collect();
        assert_eq!(lens, vec![0, 3, 1 << 10, 1 << 15, 1 << 20, 1 << 25, 3, 1500]);
        assert_eq!(MESSAGE_FIXTURES[7].message()[..6], *b"abcabc");
    }

    #[test]
    fn test_vectors_xor_pad() {
        let text = render_test_vectors(&kdf(), NONCE, &ZeroHash).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 8 * 5);
        assert_eq!(
            &lines[..5],
            &[
                "Message: <empty>",
                "32:AE135F82",
                "64:D13745D4304F1842",
                "96:8DDCC1691AA6BEFBF01A2661",
                "128:8DDCC1691AA6BEFBF01A2661B7760AF8",
            ]
        );
        assert_eq!(lines[35], "Message: 'abc' * 500");
    }

    #[test]
    fn test_vectors_reject_wrong_width() {
        let err = render_test_vectors(&kdf(), NONCE, &ShortHash).unwrap_err();
        assert!(matches!(
            err,
            ArtifactError::HashLength { tag_bits: 32, actual: 2 }
        ));
    }

    #[test]
    fn test_memory_sink_collects() {
        let mut sink = MemorySink::new();
        let written = write_artifacts(&kdf(), NONCE, &mut sink, None).unwrap();
        assert_eq!(written, vec![KEY_HEADER_NAME, VECTOR_HEADER_NAME]);
        assert_eq!(sink.names().count(), 2);
        assert!(sink.get(TEST_VECTOR_NAME).is_none());
        assert!(sink.get(KEY_HEADER_NAME).unwrap().starts_with(HEADER_PREAMBLE));
    }

    #[test]
    fn test_directory_sink_writes_files() {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("umac_artifacts_{unique}"));
        let mut sink = DirectorySink::new(dir.join("nested"));
        sink.write_artifact("hello.txt", "hello\nworld\n").unwrap();
        let contents = fs::read_to_string(sink.path_of("hello.txt")).unwrap();
        assert_eq!(contents, "hello\nworld\n");
        fs::remove_dir_all(&dir).unwrap();
    }
}
