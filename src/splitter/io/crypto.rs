//! Decryption of password-protected OOXML packages.
//!
//! Excel stores an encrypted workbook as an OLE compound file with two streams:
//! `EncryptionInfo` (the key descriptor) and `EncryptedPackage` (the real ZIP
//! package, AES-CBC encrypted in 4096-byte segments). Only Agile encryption
//! (version 4.4, the default since Excel 2010) is supported.
//!
//! Password verification follows MS-OFFCRYPTO: the iterated password hash is
//! computed once and used to derive three block keys, which decrypt the
//! verifier input, the verifier hash, and finally the package key.

use std::io::{Cursor, Read, Seek};

use aes::{Aes128, Aes192, Aes256};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use cbc::Decryptor;
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, KeyIvInit};
use quick_xml::Reader as XmlReader;
use quick_xml::events::{BytesStart, Event};
use sha1::Digest;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

/// Magic bytes opening every OLE compound file.
const CFB_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const SEGMENT_LEN: usize = 4096;
const AES_BLOCK_LEN: usize = 16;
const VERIFIER_INPUT_LEN: usize = 16;

const VERIFIER_HASH_INPUT_BLOCK: [u8; 8] = [0xFE, 0xA7, 0xD2, 0x76, 0x3B, 0x4B, 0x9E, 0x79];
const VERIFIER_HASH_VALUE_BLOCK: [u8; 8] = [0xD7, 0xAA, 0x0F, 0x6D, 0x30, 0x61, 0x34, 0x4E];
const KEY_VALUE_BLOCK: [u8; 8] = [0x14, 0x6E, 0x0B, 0xE7, 0xAB, 0xAC, 0xD0, 0xD6];

/// Failures while unlocking an encrypted package.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid password")]
    InvalidPassword,

    #[error("unsupported encryption: {0}")]
    Unsupported(String),

    #[error("malformed encrypted package: {0}")]
    Malformed(&'static str),

    #[error("compound file error: {0}")]
    Container(#[from] std::io::Error),
}

/// Returns `true` when `bytes` starts with the OLE compound file signature.
pub fn is_compound_file(bytes: &[u8]) -> bool {
    bytes.starts_with(&CFB_SIGNATURE)
}

/// Returns `true` when the compound file carries an `EncryptedPackage` stream.
pub fn is_encrypted_package(bytes: &[u8]) -> bool {
    if !is_compound_file(bytes) {
        return false;
    }
    cfb::CompoundFile::open(Cursor::new(bytes))
        .map(|compound| compound.is_stream("/EncryptedPackage"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    fn parse(name: &[u8]) -> Result<Self, CryptoError> {
        match String::from_utf8_lossy(name).trim().to_ascii_uppercase().as_str() {
            "SHA1" | "SHA-1" => Ok(HashAlgorithm::Sha1),
            "SHA256" | "SHA-256" => Ok(HashAlgorithm::Sha256),
            "SHA384" | "SHA-384" => Ok(HashAlgorithm::Sha384),
            "SHA512" | "SHA-512" => Ok(HashAlgorithm::Sha512),
            other => Err(CryptoError::Unsupported(format!("hash algorithm {other}"))),
        }
    }

    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => sha1::Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }
}

/// The subset of an Agile `EncryptionInfo` descriptor needed for password decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgileInfo {
    pub key_data_salt: Vec<u8>,
    pub key_data_hash: HashAlgorithm,
    pub key_data_block_size: usize,
    pub spin_count: u32,
    pub password_salt: Vec<u8>,
    pub password_hash: HashAlgorithm,
    pub key_bits: usize,
    pub encrypted_key_value: Vec<u8>,
    pub encrypted_verifier_hash_input: Vec<u8>,
    pub encrypted_verifier_hash_value: Vec<u8>,
}

/// Decrypts an encrypted OOXML container, returning the plain ZIP package.
pub fn decrypt_package(container: &[u8], password: &str) -> Result<Vec<u8>, CryptoError> {
    let mut compound = cfb::CompoundFile::open(Cursor::new(container))?;
    let info_stream = read_stream(&mut compound, "EncryptionInfo")?;
    let package_stream = read_stream(&mut compound, "EncryptedPackage")?;

    let info = parse_encryption_info(&info_stream)?;
    let key = secret_key(&info, password)?;
    decrypt_segments(&info, &key, &package_stream)
}

fn read_stream<F: Read + Seek>(
    compound: &mut cfb::CompoundFile<F>,
    name: &str,
) -> Result<Vec<u8>, CryptoError> {
    let mut stream = compound.open_stream(format!("/{name}"))?;
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Parses the `EncryptionInfo` stream; anything but Agile (4.4) is unsupported.
pub fn parse_encryption_info(bytes: &[u8]) -> Result<AgileInfo, CryptoError> {
    if bytes.len() < 8 {
        return Err(CryptoError::Malformed("EncryptionInfo header is truncated"));
    }
    let major = u16::from_le_bytes([bytes[0], bytes[1]]);
    let minor = u16::from_le_bytes([bytes[2], bytes[3]]);
    if (major, minor) != (4, 4) {
        return Err(CryptoError::Unsupported(format!(
            "EncryptionInfo version {major}.{minor} (only Agile 4.4 is supported)"
        )));
    }
    parse_agile_xml(&bytes[8..])
}

fn parse_agile_xml(xml: &[u8]) -> Result<AgileInfo, CryptoError> {
    let mut reader = XmlReader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut key_data: Option<Attributes> = None;
    let mut password_key: Option<Attributes> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|_| CryptoError::Malformed("EncryptionInfo XML is not well formed"))?;
        match event {
            Event::Start(element) | Event::Empty(element) => {
                match element.local_name().as_ref() {
                    b"keyData" => key_data = Some(Attributes::read(&element)?),
                    b"encryptedKey" => {
                        // Certificate key encryptors share the element name but carry no spin count.
                        let attrs = Attributes::read(&element)?;
                        if attrs.get(b"spinCount").is_some() {
                            password_key = Some(attrs);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let key_data = key_data.ok_or(CryptoError::Malformed("missing <keyData> element"))?;
    let password_key = password_key.ok_or(CryptoError::Unsupported(
        "no password key encryptor".to_string(),
    ))?;

    Ok(AgileInfo {
        key_data_salt: key_data.base64(b"saltValue")?,
        key_data_hash: HashAlgorithm::parse(key_data.required(b"hashAlgorithm")?)?,
        key_data_block_size: key_data.number(b"blockSize")?,
        spin_count: password_key.number(b"spinCount")?,
        password_salt: password_key.base64(b"saltValue")?,
        password_hash: HashAlgorithm::parse(password_key.required(b"hashAlgorithm")?)?,
        key_bits: password_key.number(b"keyBits")?,
        encrypted_key_value: password_key.base64(b"encryptedKeyValue")?,
        encrypted_verifier_hash_input: password_key.base64(b"encryptedVerifierHashInput")?,
        encrypted_verifier_hash_value: password_key.base64(b"encryptedVerifierHashValue")?,
    })
}

struct Attributes(Vec<(Vec<u8>, Vec<u8>)>);

impl Attributes {
    fn read(element: &BytesStart<'_>) -> Result<Self, CryptoError> {
        let mut pairs = Vec::new();
        for attr in element.attributes().with_checks(false) {
            let attr = attr.map_err(|_| CryptoError::Malformed("invalid XML attribute"))?;
            pairs.push((attr.key.local_name().as_ref().to_vec(), attr.value.into_owned()));
        }
        Ok(Self(pairs))
    }

    fn get(&self, name: &[u8]) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(key, _)| key.as_slice() == name)
            .map(|(_, value)| value.as_slice())
    }

    fn required(&self, name: &[u8]) -> Result<&[u8], CryptoError> {
        self.get(name)
            .ok_or(CryptoError::Malformed("missing attribute in EncryptionInfo"))
    }

    fn number<T: std::str::FromStr>(&self, name: &[u8]) -> Result<T, CryptoError> {
        String::from_utf8_lossy(self.required(name)?)
            .trim()
            .parse()
            .map_err(|_| CryptoError::Malformed("invalid numeric attribute"))
    }

    fn base64(&self, name: &[u8]) -> Result<Vec<u8>, CryptoError> {
        // Pretty-printed descriptors may wrap long values or drop the padding.
        let cleaned: Vec<u8> = self
            .required(name)?
            .iter()
            .copied()
            .filter(|byte| !byte.is_ascii_whitespace())
            .collect();
        STANDARD
            .decode(&cleaned)
            .or_else(|_| STANDARD_NO_PAD.decode(&cleaned))
            .map_err(|_| CryptoError::Malformed("invalid base64 attribute"))
    }
}

fn password_utf16le(password: &str) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(
        password
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect(),
    )
}

/// `H0 = Hash(salt || password)`, then `Hn = Hash(LE32(n) || Hn-1)` for `spin_count` rounds.
fn iterated_hash(
    password: &str,
    salt: &[u8],
    hash: HashAlgorithm,
    spin_count: u32,
) -> Zeroizing<Vec<u8>> {
    let mut seed = Zeroizing::new(salt.to_vec());
    seed.extend_from_slice(&password_utf16le(password));
    let mut digest = Zeroizing::new(hash.digest(&seed));

    let mut round = Zeroizing::new(Vec::with_capacity(4 + digest.len()));
    for index in 0..spin_count {
        round.clear();
        round.extend_from_slice(&index.to_le_bytes());
        round.extend_from_slice(&digest);
        digest = Zeroizing::new(hash.digest(&round));
    }
    digest
}

/// Truncates or pads (with `0x36`) key material to `len` bytes.
fn fit_to_length(mut bytes: Vec<u8>, len: usize) -> Vec<u8> {
    bytes.resize(len, 0x36);
    bytes
}

fn derive_key(
    iterated: &[u8],
    block: &[u8],
    hash: HashAlgorithm,
    key_bits: usize,
) -> Zeroizing<Vec<u8>> {
    let mut input = Zeroizing::new(iterated.to_vec());
    input.extend_from_slice(block);
    Zeroizing::new(fit_to_length(hash.digest(&input), key_bits / 8))
}

/// Constant-time check that `decrypted` starts with `expected`.
fn verifier_matches(expected: &[u8], decrypted: &[u8]) -> bool {
    decrypted
        .get(..expected.len())
        .is_some_and(|prefix| bool::from(prefix.ct_eq(expected)))
}

fn segment_iv(info: &AgileInfo, segment: u32) -> Vec<u8> {
    let mut input = info.key_data_salt.clone();
    input.extend_from_slice(&segment.to_le_bytes());
    fit_to_length(info.key_data_hash.digest(&input), info.key_data_block_size)
}

fn secret_key(info: &AgileInfo, password: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if info.key_bits == 0 || info.key_bits % 8 != 0 {
        return Err(CryptoError::Malformed("keyBits is not a whole number of bytes"));
    }
    let iterated = iterated_hash(
        password,
        &info.password_salt,
        info.password_hash,
        info.spin_count,
    );

    let input_key = derive_key(
        &iterated,
        &VERIFIER_HASH_INPUT_BLOCK,
        info.password_hash,
        info.key_bits,
    );
    let verifier_input = Zeroizing::new(aes_cbc_decrypt(
        &input_key,
        &info.password_salt,
        &info.encrypted_verifier_hash_input,
    )?);

    let value_key = derive_key(
        &iterated,
        &VERIFIER_HASH_VALUE_BLOCK,
        info.password_hash,
        info.key_bits,
    );
    let verifier_value = Zeroizing::new(aes_cbc_decrypt(
        &value_key,
        &info.password_salt,
        &info.encrypted_verifier_hash_value,
    )?);

    let input = verifier_input
        .get(..VERIFIER_INPUT_LEN)
        .ok_or(CryptoError::Malformed("verifier input is truncated"))?;
    let expected = info.password_hash.digest(input);
    // The stored hash is padded to the AES block size; compare the digest prefix only.
    if !verifier_matches(&expected, &verifier_value) {
        return Err(CryptoError::InvalidPassword);
    }

    let value_key = derive_key(&iterated, &KEY_VALUE_BLOCK, info.password_hash, info.key_bits);
    let mut key = Zeroizing::new(aes_cbc_decrypt(
        &value_key,
        &info.password_salt,
        &info.encrypted_key_value,
    )?);
    let key_len = info.key_bits / 8;
    if key.len() < key_len {
        return Err(CryptoError::Malformed("decrypted key is truncated"));
    }
    key.truncate(key_len);
    Ok(key)
}

fn decrypt_segments(info: &AgileInfo, key: &[u8], package: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let (header, ciphertext) = package
        .split_first_chunk::<8>()
        .ok_or(CryptoError::Malformed("EncryptedPackage header is truncated"))?;
    let size = usize::try_from(u64::from_le_bytes(*header))
        .map_err(|_| CryptoError::Malformed("EncryptedPackage size is too large"))?;

    let mut plain = Vec::with_capacity(ciphertext.len());
    for (index, segment) in ciphertext.chunks(SEGMENT_LEN).enumerate() {
        if plain.len() >= size {
            break;
        }
        let segment_index = u32::try_from(index)
            .map_err(|_| CryptoError::Malformed("too many EncryptedPackage segments"))?;
        let aligned = segment.len() - segment.len() % AES_BLOCK_LEN;
        let iv = segment_iv(info, segment_index);
        plain.extend_from_slice(&aes_cbc_decrypt(key, &iv, &segment[..aligned])?);
    }

    if plain.len() < size {
        return Err(CryptoError::Malformed("EncryptedPackage is truncated"));
    }
    plain.truncate(size);
    Ok(plain)
}

fn aes_cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() % AES_BLOCK_LEN != 0 {
        return Err(CryptoError::Malformed("ciphertext is not AES block aligned"));
    }
    let mut buf = ciphertext.to_vec();
    let bad_key = |_| CryptoError::Malformed("invalid AES key or IV length");
    let bad_data = |_| CryptoError::Malformed("AES-CBC decryption failed");
    match key.len() {
        16 => {
            Decryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(bad_key)?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(bad_data)?;
        }
        24 => {
            Decryptor::<Aes192>::new_from_slices(key, iv)
                .map_err(bad_key)?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(bad_data)?;
        }
        32 => {
            Decryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(bad_key)?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(bad_data)?;
        }
        _ => return Err(CryptoError::Malformed("unsupported AES key length")),
    }
    Ok(buf)
}
