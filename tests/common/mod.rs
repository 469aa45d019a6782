#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use aes::Aes256;
use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::NoPadding};

pub const APPID: &str = "wx0123456789abcdef";
pub const OTHER_APPID: &str = "wxfedcba9876543210";

/// Assemble a plain container holding `files` in order.
pub fn build_package(files: &[(&str, &[u8])]) -> Vec<u8> {
    let raw: Vec<(&[u8], &[u8])> = files
        .iter()
        .map(|(name, data)| (name.as_bytes(), *data))
        .collect();
    build_package_raw(&raw)
}

/// Like [`build_package`], with names given as raw bytes.
pub fn build_package_raw(files: &[(&[u8], &[u8])]) -> Vec<u8> {
    let index_len: usize = files.iter().map(|(name, _)| 12 + name.len()).sum();
    let data_start = 18 + index_len;
    let body_len: usize = files.iter().map(|(_, data)| data.len()).sum();

    let mut out = vec![0xBE];
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&(index_len as u32 + 4).to_be_bytes());
    out.extend_from_slice(&(body_len as u32).to_be_bytes());
    out.push(0xED);
    out.extend_from_slice(&(files.len() as u32).to_be_bytes());

    let mut offset = data_start;
    for (name, data) in files {
        out.extend_from_slice(&(name.len() as u32).to_be_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        offset += data.len();
    }
    for (_, data) in files {
        out.extend_from_slice(data);
    }
    out
}

/// A small mini-program, large enough to be encrypted.
pub fn sample_package() -> Vec<u8> {
    let filler: Vec<u8> = (0..2048u32).map(|i| (i % 200) as u8).collect();
    build_package(&[
        ("/app.json", br#"{"pages":["pages/index/index"],"window":{"title":"demo"}}"#.as_slice()),
        ("/app.js", b"App({})".as_slice()),
        ("/pages/index/index.wxml", b"<view><text>hi</text></view>".as_slice()),
        ("/static/blob.bin", filler.as_slice()),
    ])
}

/// Apply the `V1MMWX` recipe to a plain container of at least 1023 bytes.
pub fn encrypt(plain: &[u8], app_id: &str) -> Vec<u8> {
    let key = seewxapkg::wxapkg::derive_key(app_id);
    let mut block = [0u8; 1024];
    block[..1023].copy_from_slice(&plain[..1023]);
    cbc::Encryptor::<Aes256>::new_from_slices(&key, b"the iv: 16 bytes")
        .unwrap()
        .encrypt_padded_mut::<NoPadding>(&mut block, 1024)
        .unwrap();

    let xor = seewxapkg::wxapkg::xor_key(app_id);
    let mut out = b"V1MMWX".to_vec();
    out.extend_from_slice(&block);
    out.extend(plain[1023..].iter().map(|b| b ^ xor));
    out
}

/// Every regular file under `root`, keyed by `/`-joined relative path.
pub fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap();
            let name = relative
                .iter()
                .map(|p| p.to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            (name, fs::read(e.path()).unwrap())
        })
        .collect()
}

/// Raw member names of the archive at `path`, sorted.
pub fn zip_raw_names(path: &Path) -> Vec<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut names: Vec<Vec<u8>> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name_raw().to_vec())
        .collect();
    names.sort();
    names
}

/// Every member of the archive at `path`, keyed by name.
pub fn read_zip(path: &Path) -> BTreeMap<String, Vec<u8>> {
    use std::io::Read;

    let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut members = BTreeMap::new();
    for i in 0..archive.len() {
        let mut member = archive.by_index(i).unwrap();
        let mut data = Vec::new();
        member.read_to_end(&mut data).unwrap();
        members.insert(member.name().to_string(), data);
    }
    members
}
