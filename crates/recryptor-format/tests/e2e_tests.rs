use recryptor_core::crypto::aead::SEGMENT_SIZE;
use recryptor_core::crypto::keys::{generate_keypair, load_private_key, load_public_key};
use recryptor_format::{
    decrypt, encode_header, encrypt, recrypt, summarize, DecryptionKey, RecipientKey,
};
use recryptor_testkit::sample_bytes;
use zeroize::Zeroizing;

#[test]
fn recrypted_header_serves_new_readers() {
    let (alice_sk, alice_pk) = generate_keypair(Some("alice pass"), Some("alice")).expect("alice");
    let (bob_sk, bob_pk) = generate_keypair(None, None).expect("bob");
    let (carol_sk, carol_pk) = generate_keypair(None, None).expect("carol");

    let alice = load_private_key(&alice_sk, || Some(Zeroizing::new("alice pass".to_string())))
        .expect("load alice");
    let bob = load_private_key(&bob_sk, || None).expect("load bob");
    let carol = load_private_key(&carol_sk, || None).expect("load carol");
    assert_eq!(load_public_key(&alice_pk).expect("alice pk"), alice.public_key());

    let plaintext = sample_bytes(SEGMENT_SIZE * 3 + 1234);
    let mut container = Vec::new();
    encrypt(
        &mut plaintext.as_slice(),
        &mut container,
        &alice,
        &[alice.public_key()],
        Some(&[100, SEGMENT_SIZE as u64 * 2]),
    )
    .expect("encrypt");

    let mut for_alice = Vec::new();
    decrypt(
        &mut container.as_slice(),
        &[DecryptionKey::new(alice.clone())],
        &mut for_alice,
        None,
    )
    .expect("alice decrypts");
    assert_eq!(for_alice, &plaintext[100..100 + SEGMENT_SIZE * 2]);

    // Swap the header in front of the untouched payload.
    let mut rest = container.as_slice();
    let recipients = [
        load_public_key(&bob_pk).expect("bob pk"),
        load_public_key(&carol_pk).expect("carol pk"),
    ];
    let header = recrypt(
        &mut rest,
        &[DecryptionKey::new(alice.clone())],
        &RecipientKey::for_recipients(&alice, recipients),
    )
    .expect("recrypt");
    assert_eq!(header.packets.len(), 4);

    let mut reissued = encode_header(&header).expect("encode");
    reissued.extend_from_slice(rest);

    for reader in [bob, carol] {
        let summaries = summarize(&header, &[DecryptionKey::new(reader.clone())]);
        assert_eq!(
            summaries.iter().filter(|s| s.packet_type.is_some()).count(),
            2
        );
        assert!(summaries
            .iter()
            .all(|s| s.writer_key == Some(alice.public_key())));

        let mut out = Vec::new();
        let summary = decrypt(
            &mut reissued.as_slice(),
            &[DecryptionKey::new(reader).with_sender(Some(alice.public_key()))],
            &mut out,
            None,
        )
        .expect("reader decrypts");
        assert_eq!(out, for_alice);
        assert_eq!(summary.opened_packets, 2);
    }
}
