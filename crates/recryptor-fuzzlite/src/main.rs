use std::env;
use std::io::{self, Cursor};

use recryptor_core::crypto::ids::PayloadCipher;
use recryptor_core::crypto::keys::PrivateKey;
use recryptor_format::{
    decrypt, decrypt_detached, encode_header, encrypt, open_packet, parse_header, read_header,
    recrypt_header, summarize, wrap_payload, DecryptionKey, FormatError, Header, PacketPayload,
    PayloadHeaderPolicy, RecipientKey, MAGIC, PACKET_PREFIX_LEN, PREAMBLE_LEN, VERSION,
};
use zeroize::Zeroizing;

const DEFAULT_ITERS: u64 = 200;
const DEFAULT_MAX_LEN: usize = 4096;
const DEFAULT_SEED: u64 = 0xA5A5_5A5A_1234_5678;
const SEED_DATA_LEN: usize = 300;

fn main() {
    let args: Vec<String> = env::args().collect();
    let iters = parse_arg(&args, "--iters")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_ITERS);
    let max_len = parse_arg(&args, "--max-len")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_MAX_LEN);
    let seed = env::var("RECRYPTOR_FUZZ_SEED")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_SEED);

    let keys = FuzzKeys::new();
    let seeds = build_seeds(&keys);
    exercise_valid_seeds(&keys, &seeds);
    check_nonce_uniqueness(&keys);

    let mut rng = XorShift64::new(seed);
    let mut stats = FuzzStats::default();

    for _ in 0..iters {
        let bytes = if rng.next_u64() % 100 < 60 {
            mutate_seed(&mut rng, &seeds, max_len)
        } else {
            random_case(&mut rng, max_len)
        };

        run_case(&keys, &mut stats, &bytes);
    }

    println!(
        "fuzz-lite completed: {} iterations (headers ok: {}, recrypt ok: {}, decrypt ok: {})",
        iters, stats.header_ok, stats.recrypt_ok, stats.decrypt_ok
    );
}

fn parse_arg<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|idx| args.get(idx + 1))
        .map(|s| s.as_str())
}

/// Fixed keys so every run with the same seed walks the same paths.
struct FuzzKeys {
    owner: PrivateKey,
    recipient: PrivateKey,
}

impl FuzzKeys {
    fn new() -> Self {
        Self {
            owner: PrivateKey::from_secret(Zeroizing::new([0x42u8; 32])),
            recipient: PrivateKey::from_secret(Zeroizing::new([0x24u8; 32])),
        }
    }

    fn owner_keys(&self) -> [DecryptionKey; 1] {
        [DecryptionKey::new(self.owner.clone())]
    }

    fn recipients(&self) -> [RecipientKey; 1] {
        [RecipientKey::new(
            self.owner.clone(),
            self.recipient.public_key(),
        )]
    }
}

#[derive(Default)]
struct FuzzStats {
    header_ok: u64,
    recrypt_ok: u64,
    decrypt_ok: u64,
}

fn build_seeds(keys: &FuzzKeys) -> Vec<Vec<u8>> {
    let mut seeds = vec![Vec::new()];

    if let Ok(bytes) = encode_header(&Header::new(Vec::new())) {
        seeds.push(bytes);
    }

    if let Ok(bytes) = build_container(keys, None) {
        seeds.push(bytes);
    }

    if let Ok(bytes) = build_container(keys, Some(&[3, 40, 7])) {
        seeds.push(bytes);
    }

    if let Ok(header) = build_mixed_header(keys) {
        if let Ok(bytes) = encode_header(&header) {
            seeds.push(bytes);
        }
        if let Ok(recrypted) = recrypt_header(&header, &keys.owner_keys(), &keys.recipients()) {
            // Owner and recipient packets side by side.
            let mut packets = header.packets.clone();
            packets.extend(recrypted.packets);
            if let Ok(bytes) = encode_header(&Header::new(packets)) {
                seeds.push(bytes);
            }
        }
    }

    seeds
}

fn build_container(keys: &FuzzKeys, edit_list: Option<&[u64]>) -> Result<Vec<u8>, FormatError> {
    let plaintext: Vec<u8> = (0..SEED_DATA_LEN).map(|i| (i % 251) as u8).collect();
    let mut container = Vec::new();
    encrypt(
        &mut plaintext.as_slice(),
        &mut container,
        &keys.owner,
        &[keys.owner.public_key()],
        edit_list,
    )?;
    Ok(container)
}

/// Data key, edit list and an unknown packet type.
fn build_mixed_header(keys: &FuzzKeys) -> Result<Header, FormatError> {
    let own = RecipientKey::new(keys.owner.clone(), keys.owner.public_key());
    let payloads = [
        PacketPayload::data_key(PayloadCipher::ChaCha20IetfPoly1305, &[0x5Au8; 32]),
        PacketPayload::edit_list(&[0, 10])?,
        PacketPayload::from_bytes(Zeroizing::new(b"\x07\x00\x00\x00opaque".to_vec())),
    ];

    let packets = payloads
        .iter()
        .map(|payload| wrap_payload(payload, &own))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Header::new(packets))
}

fn exercise_valid_seeds(keys: &FuzzKeys, seeds: &[Vec<u8>]) {
    for seed in seeds {
        if let Ok(header) = read_header(&mut Cursor::new(seed)) {
            check_roundtrip(&header);
            let _ = summarize(&header, &keys.owner_keys());
        }
        let _ = decrypt(
            &mut Cursor::new(seed),
            &keys.owner_keys(),
            &mut io::sink(),
            None,
        );
    }
}

fn check_nonce_uniqueness(keys: &FuzzKeys) {
    let payload = PacketPayload::data_key(PayloadCipher::ChaCha20IetfPoly1305, &[0xABu8; 32]);
    let [recipient] = keys.recipients();

    let first = wrap_payload(&payload, &recipient);
    let second = wrap_payload(&payload, &recipient);

    if let (Ok(first), Ok(second)) = (first, second) {
        if first.body == second.body {
            eprintln!("fuzz-lite: repeated packet ciphertext detected");
            std::process::exit(1);
        }
    }
}

fn check_roundtrip(header: &Header) {
    let encoded = match encode_header(header) {
        Ok(encoded) => encoded,
        Err(err) => {
            eprintln!("fuzz-lite: parsed header failed to encode: {err}");
            std::process::exit(1);
        }
    };

    match parse_header(&encoded) {
        Ok(reparsed) if reparsed == *header => {}
        _ => {
            eprintln!("fuzz-lite: header did not survive an encode/parse cycle");
            std::process::exit(1);
        }
    }
}

/// Every packet of a recrypted header must open for the new recipient.
fn check_recrypted(keys: &FuzzKeys, header: &Header) {
    let reader = [DecryptionKey::new(keys.recipient.clone())];
    for (index, packet) in header.packets.iter().enumerate() {
        if open_packet(packet, &reader).is_err() {
            eprintln!("fuzz-lite: recrypted packet {index} is unreadable for its recipient");
            std::process::exit(1);
        }
    }
}

fn mutate_seed(rng: &mut XorShift64, seeds: &[Vec<u8>], max_len: usize) -> Vec<u8> {
    let mut bytes = seeds[(rng.next_u64() as usize) % seeds.len()].clone();
    mutate_bytes(rng, &mut bytes, max_len);
    if rng.next_u64() % 100 < 30 {
        splice_with_seed(rng, &mut bytes, seeds, max_len);
    }
    bytes
}

fn random_case(rng: &mut XorShift64, max_len: usize) -> Vec<u8> {
    let len = (rng.next_u64() as usize) % (max_len + 1);
    let mut bytes = vec![0u8; len];
    rng.fill_bytes(&mut bytes);
    if bytes.len() >= PREAMBLE_LEN && rng.next_u64() % 4 == 0 {
        bytes[0..8].copy_from_slice(&MAGIC);
        bytes[8..12].copy_from_slice(&VERSION.to_le_bytes());
        let count = (rng.next_u64() % 4) as u32;
        bytes[12..16].copy_from_slice(&count.to_le_bytes());
    }
    mutate_bytes(rng, &mut bytes, max_len);
    bytes
}

fn run_case(keys: &FuzzKeys, stats: &mut FuzzStats, bytes: &[u8]) {
    if let Ok(header) = parse_header(bytes) {
        check_roundtrip(&header);
    }

    let header = match read_header(&mut Cursor::new(bytes)) {
        Ok(header) => header,
        Err(_) => return,
    };
    stats.header_ok += 1;
    check_roundtrip(&header);

    let owner = keys.owner_keys();
    let _ = summarize(&header, &owner);

    if let Ok(recrypted) = recrypt_header(&header, &owner, &keys.recipients()) {
        stats.recrypt_ok += 1;
        check_recrypted(keys, &recrypted);
    }

    if decrypt(&mut Cursor::new(bytes), &owner, &mut io::sink(), None).is_ok() {
        stats.decrypt_ok += 1;
    }

    let _ = decrypt_detached(
        Cursor::new(bytes),
        Cursor::new(bytes),
        &owner,
        &mut io::sink(),
        Some(&keys.owner.public_key()),
        PayloadHeaderPolicy::Discard,
    );
}

fn mutate_bytes(rng: &mut XorShift64, bytes: &mut Vec<u8>, max_len: usize) {
    if bytes.is_empty() && max_len > 0 {
        bytes.push(0);
    }

    let mutations = 1 + (rng.next_u64() % 8) as usize;
    for _ in 0..mutations {
        match rng.next_u64() % 9 {
            0 => flip_byte(rng, bytes),
            1 => insert_byte(rng, bytes, max_len),
            2 => delete_byte(rng, bytes),
            3 => truncate_bytes(rng, bytes),
            4 => overwrite_range(rng, bytes),
            5 => structured_preamble_tweak(rng, bytes),
            6 => duplicate_range(rng, bytes, max_len),
            7 => structured_packet_tweak(rng, bytes),
            _ => swap_ranges(rng, bytes),
        }
    }
}

fn flip_byte(rng: &mut XorShift64, bytes: &mut [u8]) {
    if bytes.is_empty() {
        return;
    }
    let idx = (rng.next_u64() as usize) % bytes.len();
    bytes[idx] ^= (rng.next_u64() as u8) | 1;
}

fn insert_byte(rng: &mut XorShift64, bytes: &mut Vec<u8>, max_len: usize) {
    if bytes.len() >= max_len {
        return;
    }
    let idx = (rng.next_u64() as usize) % (bytes.len() + 1);
    let value = rng.next_u64() as u8;
    bytes.insert(idx, value);
}

fn delete_byte(rng: &mut XorShift64, bytes: &mut Vec<u8>) {
    if bytes.is_empty() {
        return;
    }
    let idx = (rng.next_u64() as usize) % bytes.len();
    bytes.remove(idx);
}

fn truncate_bytes(rng: &mut XorShift64, bytes: &mut Vec<u8>) {
    if bytes.is_empty() {
        return;
    }
    let new_len = (rng.next_u64() as usize) % (bytes.len() + 1);
    bytes.truncate(new_len);
}

fn overwrite_range(rng: &mut XorShift64, bytes: &mut [u8]) {
    if bytes.is_empty() {
        return;
    }
    let start = (rng.next_u64() as usize) % bytes.len();
    let len = ((rng.next_u64() as usize) % 8).max(1);
    for i in 0..len {
        if start + i >= bytes.len() {
            break;
        }
        bytes[start + i] = rng.next_u64() as u8;
    }
}

fn duplicate_range(rng: &mut XorShift64, bytes: &mut Vec<u8>, max_len: usize) {
    if bytes.is_empty() || bytes.len() >= max_len {
        return;
    }
    let start = (rng.next_u64() as usize) % bytes.len();
    let len = ((rng.next_u64() as usize) % 16).max(1);
    let end = std::cmp::min(start + len, bytes.len());
    let slice = bytes[start..end].to_vec();
    let remaining = max_len - bytes.len();
    let to_insert = std::cmp::min(slice.len(), remaining);
    bytes.splice(start..start, slice.into_iter().take(to_insert));
}

fn structured_preamble_tweak(rng: &mut XorShift64, bytes: &mut [u8]) {
    if bytes.len() < PREAMBLE_LEN {
        return;
    }
    match rng.next_u64() % 5 {
        0 => bytes[0..8].copy_from_slice(&MAGIC),
        1 => {
            let version = match rng.next_u64() % 3 {
                0 => VERSION,
                1 => VERSION + 1,
                _ => rng.next_u64() as u32,
            };
            write_u32(bytes, 8, version);
        }
        2 => {
            let count = read_u32(bytes, 12).unwrap_or(0);
            let count = match rng.next_u64() % 4 {
                0 => count.wrapping_add(1),
                1 => count.wrapping_sub(1),
                2 => u32::MAX,
                _ => 0,
            };
            write_u32(bytes, 12, count);
        }
        3 => write_u32(bytes, 12, (rng.next_u64() % 8) as u32),
        _ => bytes[(rng.next_u64() as usize) % 8] ^= 0x20,
    }
}

/// Rewrites the length or method of a packet found by walking the framing.
fn structured_packet_tweak(rng: &mut XorShift64, bytes: &mut [u8]) {
    let offsets = packet_offsets(bytes);
    if offsets.is_empty() {
        return;
    }
    let offset = offsets[(rng.next_u64() as usize) % offsets.len()];
    let length = read_u32(bytes, offset).unwrap_or(0);

    match rng.next_u64() % 6 {
        0 => write_u32(bytes, offset, length.wrapping_add(1)),
        1 => write_u32(bytes, offset, length.saturating_sub(1)),
        2 => write_u32(bytes, offset, (rng.next_u64() % PACKET_PREFIX_LEN as u64) as u32),
        3 => write_u32(bytes, offset, u32::MAX),
        4 => write_u32(bytes, offset + 4, (rng.next_u64() % 3) as u32),
        _ => {
            // Corrupt the writer public key at the front of the body.
            let key_at = offset + PACKET_PREFIX_LEN + (rng.next_u64() as usize) % 32;
            if key_at < bytes.len() {
                bytes[key_at] ^= 0x80;
            }
        }
    }
}

fn packet_offsets(bytes: &[u8]) -> Vec<usize> {
    let count = match read_u32(bytes, 12) {
        Some(count) if bytes.starts_with(&MAGIC) => count as usize,
        _ => return Vec::new(),
    };

    let mut offsets = Vec::new();
    let mut offset = PREAMBLE_LEN;
    while offsets.len() < count {
        let length = match read_u32(bytes, offset) {
            Some(length) if length as usize >= PACKET_PREFIX_LEN => length as usize,
            _ => break,
        };
        offsets.push(offset);
        offset = offset.saturating_add(length);
    }
    offsets
}

fn swap_ranges(rng: &mut XorShift64, bytes: &mut [u8]) {
    if bytes.len() < 2 {
        return;
    }
    let len = ((rng.next_u64() as usize) % 8).max(1);
    let start_a = (rng.next_u64() as usize) % bytes.len();
    let start_b = (rng.next_u64() as usize) % bytes.len();
    for i in 0..len {
        let a = start_a + i;
        let b = start_b + i;
        if a >= bytes.len() || b >= bytes.len() {
            break;
        }
        bytes.swap(a, b);
    }
}

fn splice_with_seed(rng: &mut XorShift64, bytes: &mut Vec<u8>, seeds: &[Vec<u8>], max_len: usize) {
    if seeds.is_empty() || max_len == 0 {
        return;
    }
    let other = &seeds[(rng.next_u64() as usize) % seeds.len()];
    if other.is_empty() {
        return;
    }
    let split_self = (rng.next_u64() as usize) % (bytes.len() + 1);
    let split_other = (rng.next_u64() as usize) % (other.len() + 1);
    let mut combined = Vec::with_capacity(std::cmp::min(max_len, split_self + other.len()));
    combined.extend_from_slice(&bytes[..split_self]);
    combined.extend_from_slice(&other[split_other..]);
    if combined.len() > max_len {
        combined.truncate(max_len);
    }
    *bytes = combined;
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    let slice = bytes.get(offset..end)?;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    if let Some(slice) = offset
        .checked_add(4)
        .and_then(|end| bytes.get_mut(offset..end))
    {
        slice.copy_from_slice(&value.to_le_bytes());
    }
}

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn fill_bytes(&mut self, buf: &mut [u8]) {
        let mut offset = 0;
        while offset < buf.len() {
            let next = self.next_u64().to_le_bytes();
            let to_copy = std::cmp::min(next.len(), buf.len() - offset);
            buf[offset..offset + to_copy].copy_from_slice(&next[..to_copy]);
            offset += to_copy;
        }
    }
}
