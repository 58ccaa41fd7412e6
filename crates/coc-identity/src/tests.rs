use super::*;

#[test]
fn test_sign_verify_roundtrip() {
    let keypair = generate_keypair();
    let public_key = keypair.public_key();

    for message in [&b""[..], b"hello", b"a longer custody payload with spaces"] {
        let signature = sign(&keypair, message);
        assert!(verify(&public_key, message, &signature));
    }
}

#[test]
fn test_tampered_message_fails() {
    let keypair = generate_keypair();
    let message = b"forward to bob".to_vec();
    let signature = keypair.sign(&message);

    for idx in 0..message.len() {
        let mut tampered = message.clone();
        tampered[idx] ^= 0x01;
        assert!(!verify(&keypair.public_key(), &tampered, &signature));
    }
}

#[test]
fn test_tampered_signature_fails() {
    let keypair = generate_keypair();
    let message = b"forward to bob";
    let signature = keypair.sign(message);

    for idx in 0..signature.as_bytes().len() {
        let mut bytes = signature.as_bytes().to_vec();
        bytes[idx] ^= 0x80;
        assert!(!verify(&keypair.public_key(), message, &Signature::new(bytes)));
    }
}

#[test]
fn test_malformed_signature_is_false() {
    let keypair = generate_keypair();
    assert!(!verify(&keypair.public_key(), b"msg", &Signature::new(vec![])));
    assert!(!verify(&keypair.public_key(), b"msg", &Signature::new(vec![7; 12])));
}

#[test]
fn test_wrong_key_fails() {
    let alice = generate_keypair();
    let bob = generate_keypair();
    let signature = alice.sign(b"msg");
    assert!(!verify(&bob.public_key(), b"msg", &signature));
}

#[test]
fn test_keypair_from_secret_is_deterministic() {
    let a = KeyPair::from_secret(&[9u8; 32]);
    let b = KeyPair::from_secret(&[9u8; 32]);
    assert_eq!(a.public_key(), b.public_key());
    assert!(b.public_key().verify(b"x", &a.sign(b"x")));
}

#[test]
fn test_public_key_bytes() {
    let keypair = generate_keypair();
    let bytes = keypair.public_key().to_bytes();
    let parsed = PublicKey::from_bytes(&bytes).unwrap();
    assert_eq!(parsed, keypair.public_key());
    assert!(PublicKey::from_bytes(&bytes[..31]).is_err());
}

#[test]
fn test_hash_content_is_stable() {
    let a = hash_content(b"hello");
    let b = hash_content(b"hello");
    assert_eq!(a, b);
    assert_ne!(a, hash_content(b"hellp"));
    assert_eq!(
        a.to_hex(),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
    assert_eq!(a.short(), "2cf24dba");
}

#[test]
fn test_hash_parts_matches_concatenation() {
    assert_eq!(hash_parts(&[b"ab", b"cd"]), hash_content(b"abcd"));
}

#[test]
fn test_digest_parse_and_serde() {
    let digest = hash_content(b"content");
    let parsed: HashDigest = digest.to_hex().parse().unwrap();
    assert_eq!(parsed, digest);
    assert!("zz".parse::<HashDigest>().is_err());

    let json = serde_json::to_string(&digest).unwrap();
    assert_eq!(json, format!("\"{}\"", digest.to_hex()));
    let back: HashDigest = serde_json::from_str(&json).unwrap();
    assert_eq!(back, digest);
}

#[test]
fn test_peer_id_short() {
    assert_eq!(PeerId::new("0123456789abcdef").short(), "01234567");
    assert_eq!(PeerId::new("bob").short(), "bob");
}
