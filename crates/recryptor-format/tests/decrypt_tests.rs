use std::io::Write;

use recryptor_core::crypto::aead::SEGMENT_SIZE;
use recryptor_core::crypto::ids::PayloadCipher;
use recryptor_core::crypto::keys::PrivateKey;
use recryptor_core::ErrorCategory;
use recryptor_format::{
    decrypt, decrypt_detached, encode_header, encrypt, recrypt, save_header_and_payload,
    wrap_payload, DecryptionKey, EditListWriter, FormatError, Header, PacketPayload,
    PayloadHeaderPolicy, RecipientKey,
};
use recryptor_testkit::{sample_bytes, TrickleReader};

fn seal_for(owner: &PrivateKey, plaintext: &[u8], edit_list: Option<&[u64]>) -> Vec<u8> {
    let mut container = Vec::new();
    encrypt(
        &mut &plaintext[..],
        &mut container,
        owner,
        &[owner.public_key()],
        edit_list,
    )
    .expect("encrypt");
    container
}

fn open_with(key: DecryptionKey, container: &[u8]) -> Result<Vec<u8>, FormatError> {
    let mut out = Vec::new();
    decrypt(&mut &container[..], &[key], &mut out, None)?;
    Ok(out)
}

#[test]
fn encrypt_decrypt_roundtrip() {
    let alice = PrivateKey::generate();
    let plaintext = sample_bytes(SEGMENT_SIZE * 2 + 17);
    let container = seal_for(&alice, &plaintext, None);

    let mut out = Vec::new();
    let summary = decrypt(
        &mut container.as_slice(),
        &[DecryptionKey::new(alice)],
        &mut out,
        None,
    )
    .expect("decrypt");
    assert_eq!(out, plaintext);
    assert_eq!(summary.segments, 3);
    assert_eq!(summary.plaintext_len, plaintext.len() as u64);
    assert_eq!(summary.opened_packets, 1);
    assert!(summary.edit_list.is_none());
}

#[test]
fn empty_plaintext_roundtrips() {
    let alice = PrivateKey::generate();
    let container = seal_for(&alice, b"", None);
    assert!(open_with(DecryptionKey::new(alice), &container)
        .expect("decrypt")
        .is_empty());
}

#[test]
fn odd_edit_list_keeps_the_tail() {
    let alice = PrivateKey::generate();
    let plaintext = sample_bytes(100);
    let container = seal_for(&alice, &plaintext, Some(&[10, 5, 20]));

    let out = open_with(DecryptionKey::new(alice), &container).expect("decrypt");
    let mut expected = plaintext[10..15].to_vec();
    expected.extend_from_slice(&plaintext[35..]);
    assert_eq!(out, expected);
}

#[test]
fn even_edit_list_drops_the_tail() {
    let alice = PrivateKey::generate();
    let plaintext = sample_bytes(SEGMENT_SIZE + 500);
    let lengths = [SEGMENT_SIZE as u64 - 3, 6];
    let container = seal_for(&alice, &plaintext, Some(&lengths));

    let out = open_with(DecryptionKey::new(alice), &container).expect("decrypt");
    assert_eq!(out, &plaintext[SEGMENT_SIZE - 3..SEGMENT_SIZE + 3]);
}

#[test]
fn empty_edit_list_means_no_edit() {
    let alice = PrivateKey::generate();
    let plaintext = sample_bytes(64);
    let container = seal_for(&alice, &plaintext, Some(&[]));
    assert_eq!(
        open_with(DecryptionKey::new(alice), &container).expect("decrypt"),
        plaintext
    );
}

#[test]
fn edit_list_writer_handles_zero_lengths() {
    let mut edited = EditListWriter::new(Vec::new(), vec![0, 3, 2]);
    edited.write_all(b"abc").expect("write");
    edited.write_all(b"defgh").expect("write");
    assert_eq!(edited.written(), 6);
    assert!(!edited.is_done());
    assert_eq!(edited.into_inner(), b"abcfgh");

    let mut edited = EditListWriter::new(Vec::new(), vec![1, 2]);
    edited.write_all(b"xyz").expect("write");
    assert!(edited.is_done());
    edited.write_all(b"ignored").expect("write");
    assert_eq!(edited.into_inner(), b"yz");
}

#[test]
fn matching_sender_is_accepted() {
    let alice = PrivateKey::generate();
    let plaintext = sample_bytes(300);
    let container = seal_for(&alice, &plaintext, None);

    let mut out = Vec::new();
    decrypt(
        &mut container.as_slice(),
        &[DecryptionKey::new(alice.clone())],
        &mut out,
        Some(&alice.public_key()),
    )
    .expect("decrypt");
    assert_eq!(out, plaintext);
}

#[test]
fn unexpected_sender_is_rejected() {
    let alice = PrivateKey::generate();
    let mallory = PrivateKey::generate();
    let container = seal_for(&alice, b"secret", None);

    let mut out = Vec::new();
    let err = decrypt(
        &mut container.as_slice(),
        &[DecryptionKey::new(alice)],
        &mut out,
        Some(&mallory.public_key()),
    )
    .unwrap_err();
    assert!(matches!(err, FormatError::SenderAuthentication { index: None }));
    assert_eq!(err.category(), ErrorCategory::SenderAuthentication);
    assert!(out.is_empty());
}

#[test]
fn foreign_key_is_unauthorized() {
    let alice = PrivateKey::generate();
    let stranger = PrivateKey::generate();
    let container = seal_for(&alice, b"secret", None);

    let err = open_with(DecryptionKey::new(stranger), &container).unwrap_err();
    assert!(matches!(err, FormatError::UnauthorizedPacket { index: None }));
    assert_eq!(err.category(), ErrorCategory::UnauthorizedPacket);
}

#[test]
fn packets_for_others_are_skipped() {
    let alice = PrivateKey::generate();
    let bob = PrivateKey::generate();
    let plaintext = sample_bytes(1000);

    let mut container = Vec::new();
    encrypt(
        &mut plaintext.as_slice(),
        &mut container,
        &alice,
        &[alice.public_key(), bob.public_key()],
        None,
    )
    .expect("encrypt");

    let mut out = Vec::new();
    let summary = decrypt(
        &mut container.as_slice(),
        &[DecryptionKey::new(bob)],
        &mut out,
        None,
    )
    .expect("decrypt");
    assert_eq!(out, plaintext);
    assert_eq!(summary.header.packets.len(), 2);
    assert_eq!(summary.opened_packets, 1);
}

#[test]
fn two_edit_lists_are_rejected() {
    let alice = PrivateKey::generate();
    let own = RecipientKey::new(alice.clone(), alice.public_key());
    let packets = vec![
        wrap_payload(
            &PacketPayload::data_key(PayloadCipher::ChaCha20IetfPoly1305, &[7u8; 32]),
            &own,
        )
        .expect("wrap"),
        wrap_payload(&PacketPayload::edit_list(&[1]).expect("edit"), &own).expect("wrap"),
        wrap_payload(&PacketPayload::edit_list(&[2]).expect("edit"), &own).expect("wrap"),
    ];
    let container = encode_header(&Header::new(packets)).expect("encode");

    let err = open_with(DecryptionKey::new(alice), &container).unwrap_err();
    assert!(matches!(err, FormatError::TooManyEditLists));
}

#[test]
fn detached_header_with_plain_payload() {
    let alice = PrivateKey::generate();
    let plaintext = sample_bytes(SEGMENT_SIZE + 1);
    let container = seal_for(&alice, &plaintext, None);

    let mut header = Vec::new();
    let mut payload = Vec::new();
    save_header_and_payload(&mut container.as_slice(), &mut header, Some(&mut payload))
        .expect("split");

    let mut out = Vec::new();
    decrypt_detached(
        header.as_slice(),
        TrickleReader::new(payload.as_slice(), 999),
        &[DecryptionKey::new(alice)],
        &mut out,
        None,
        PayloadHeaderPolicy::Keep,
    )
    .expect("decrypt");
    assert_eq!(out, plaintext);
}

#[test]
fn detached_header_replaces_payload_header() {
    let alice = PrivateKey::generate();
    let bob = PrivateKey::generate();
    let plaintext = sample_bytes(4096);
    let container = seal_for(&alice, &plaintext, None);

    // Header re-addressed to bob, payload still carrying alice's header.
    let mut original = container.as_slice();
    let recrypted = recrypt(
        &mut original,
        &[DecryptionKey::new(alice.clone())],
        &[RecipientKey::new(alice, bob.public_key())],
    )
    .expect("recrypt");
    let header = encode_header(&recrypted).expect("encode");

    let mut out = Vec::new();
    decrypt_detached(
        header.as_slice(),
        container.as_slice(),
        &[DecryptionKey::new(bob)],
        &mut out,
        None,
        PayloadHeaderPolicy::Discard,
    )
    .expect("decrypt");
    assert_eq!(out, plaintext);
}

#[test]
fn truncated_payload_is_reported() {
    let alice = PrivateKey::generate();
    let plaintext = sample_bytes(SEGMENT_SIZE + 10);
    let mut container = seal_for(&alice, &plaintext, None);
    container.truncate(container.len() - 20);

    let err = open_with(DecryptionKey::new(alice), &container).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::TruncatedStream);
}

#[test]
fn tampered_segment_fails_authentication() {
    let alice = PrivateKey::generate();
    let mut container = seal_for(&alice, &sample_bytes(200), None);
    let last = container.len() - 1;
    container[last] ^= 0x01;

    let err = open_with(DecryptionKey::new(alice), &container).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Crypto);
}
