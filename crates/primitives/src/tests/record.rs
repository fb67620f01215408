use libp2p_identity::Keypair;

use crate::multicodec::header;
use crate::name::Name;
use crate::record::{
    AuthenticityError, FormatError, Record, RecordError, VerifiedRecord, ENVELOPE_CODEC,
    ENVELOPE_HEADER, JSON_CODEC, JSON_HEADER,
};

const TARGET: &str = "/ipfs/QmWATWQ7fVPP2EFGu71UkfnqhYXDYH566qy47CnJDgvs8u";

fn envelope_body(envelope: &[u8]) -> &str {
    let body = &envelope[ENVELOPE_HEADER.len() + JSON_HEADER.len()..];
    core::str::from_utf8(body).unwrap()
}

#[test]
fn test_headers_match_multicodec_encoding() {
    assert_eq!(ENVELOPE_HEADER, header(ENVELOPE_CODEC).as_slice());
    assert_eq!(JSON_HEADER, header(JSON_CODEC).as_slice());
}

#[test]
fn test_encode_decode_preserves_fields() {
    let keypair = Keypair::generate_ed25519();
    let record = Record::new(TARGET, 1_700_000_000).with_salt("blog");

    let envelope = record.encode(&keypair).unwrap();
    let verified = VerifiedRecord::decode(&envelope).unwrap();

    assert_eq!(verified.record(), &record);
    assert_eq!(verified.order(), 1_700_000_000);
    assert_eq!(verified.target(), TARGET);
    assert_eq!(verified.public_key(), &keypair.public());
    assert_eq!(verified.name(), &Name::derive(&keypair.public(), "blog"));
}

#[test]
fn test_envelope_layout() {
    let keypair = Keypair::generate_ed25519();
    let envelope = Record::new(TARGET, 7).encode(&keypair).unwrap();

    assert!(envelope.starts_with(ENVELOPE_HEADER));
    assert!(envelope[ENVELOPE_HEADER.len()..].starts_with(JSON_HEADER));

    let body = envelope_body(&envelope);
    assert!(body.starts_with("{\"rec\":{\"cid\":"));
    assert!(body.contains("\"ord\":7"));
    assert!(body.contains("\"sig\":\""));
    assert!(!body.contains('='), "base64 must be unpadded");
}

#[test]
fn test_missing_salt_defaults_to_empty() {
    let keypair = Keypair::generate_ed25519();
    let envelope = Record::new(TARGET, 1).encode(&keypair).unwrap();

    let body = envelope_body(&envelope).replace(",\"salt\":\"\"", "");
    assert!(!body.contains("salt"));

    // Re-sign the trimmed record so only the salt handling is exercised.
    let rec_start = body.find("{\"cid\"").unwrap();
    let rec_end = body.find("},\"sig\"").unwrap() + 1;
    let rec = &body[rec_start..rec_end];
    let sig = keypair.sign(rec.as_bytes()).unwrap();

    let mut rebuilt = Vec::new();
    rebuilt.extend_from_slice(ENVELOPE_HEADER);
    rebuilt.extend_from_slice(JSON_HEADER);
    rebuilt.extend_from_slice(
        format!(
            "{{\"rec\":{rec},\"sig\":\"{}\"}}",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD_NO_PAD, sig)
        )
        .as_bytes(),
    );

    let verified = VerifiedRecord::decode(&rebuilt).unwrap();
    assert_eq!(verified.record().salt, "");
    assert_eq!(verified.name(), &Name::derive(&keypair.public(), ""));
}

#[test]
fn test_tampered_order_fails_authenticity() {
    let keypair = Keypair::generate_ed25519();
    let envelope = Record::new(TARGET, 10).encode(&keypair).unwrap();

    let tampered = String::from_utf8(envelope)
        .unwrap()
        .replacen("\"ord\":10", "\"ord\":11", 1);

    let err = VerifiedRecord::decode(tampered.as_bytes()).unwrap_err();
    assert!(matches!(
        err,
        RecordError::Authenticity(AuthenticityError::InvalidSignature)
    ));
    assert!(err.is_authenticity());
}

#[test]
fn test_tampered_target_fails_authenticity() {
    let keypair = Keypair::generate_ed25519();
    let envelope = Record::new(TARGET, 10).encode(&keypair).unwrap();

    let tampered = String::from_utf8(envelope)
        .unwrap()
        .replacen("QmWATWQ7", "QmWATWQ8", 1);

    let err = VerifiedRecord::decode(tampered.as_bytes()).unwrap_err();
    assert!(err.is_authenticity());
}

#[test]
fn test_whitespace_in_rec_breaks_signature() {
    let keypair = Keypair::generate_ed25519();
    let envelope = Record::new(TARGET, 3).encode(&keypair).unwrap();

    let tampered = String::from_utf8(envelope)
        .unwrap()
        .replacen("\"ord\":3", "\"ord\": 3", 1);

    let err = VerifiedRecord::decode(tampered.as_bytes()).unwrap_err();
    assert!(err.is_authenticity());
}

#[test]
fn test_swapped_public_key_fails_authenticity() {
    let signer = Keypair::generate_ed25519();
    let other = Keypair::generate_ed25519();

    let signed = String::from_utf8(Record::new(TARGET, 5).encode(&signer).unwrap()).unwrap();
    let by_other = String::from_utf8(Record::new(TARGET, 5).encode(&other).unwrap()).unwrap();

    let pkey_of = |s: &str| {
        let start = s.find("\"pkey\":\"").unwrap() + 8;
        let end = start + s[start..].find('"').unwrap();
        s[start..end].to_owned()
    };

    let forged = signed.replacen(&pkey_of(&signed), &pkey_of(&by_other), 1);

    let err = VerifiedRecord::decode(forged.as_bytes()).unwrap_err();
    assert!(matches!(
        err,
        RecordError::Authenticity(AuthenticityError::InvalidSignature)
    ));
}

#[test]
fn test_missing_headers_are_format_errors() {
    let keypair = Keypair::generate_ed25519();
    let envelope = Record::new(TARGET, 1).encode(&keypair).unwrap();

    let without_outer = &envelope[ENVELOPE_HEADER.len()..];
    assert!(matches!(
        VerifiedRecord::decode(without_outer),
        Err(RecordError::Format(FormatError::MissingHeader(ENVELOPE_CODEC)))
    ));

    let mut without_inner = ENVELOPE_HEADER.to_vec();
    without_inner.extend_from_slice(&envelope[ENVELOPE_HEADER.len() + JSON_HEADER.len()..]);
    assert!(matches!(
        VerifiedRecord::decode(&without_inner),
        Err(RecordError::Format(FormatError::MissingHeader(JSON_CODEC)))
    ));
}

#[test]
fn test_garbage_is_format_error() {
    let mut garbage = ENVELOPE_HEADER.to_vec();
    garbage.extend_from_slice(JSON_HEADER);
    garbage.extend_from_slice(b"{\"rec\":");

    let err = VerifiedRecord::decode(&garbage).unwrap_err();
    assert!(matches!(err, RecordError::Format(FormatError::Json(_))));
    assert!(!err.is_authenticity());

    assert!(VerifiedRecord::decode(b"").is_err());
}

#[test]
fn test_bad_signature_encoding_is_format_error() {
    let keypair = Keypair::generate_ed25519();
    let envelope = String::from_utf8(Record::new(TARGET, 1).encode(&keypair).unwrap()).unwrap();

    let start = envelope.find("\"sig\":\"").unwrap() + 7;
    let mut broken = envelope.clone();
    broken.insert(start, '!');

    let err = VerifiedRecord::decode(broken.as_bytes()).unwrap_err();
    assert!(matches!(
        err,
        RecordError::Format(FormatError::Base64 { field: "sig", .. })
    ));
}

#[test]
fn test_decode_for_checks_expected_name() {
    let keypair = Keypair::generate_ed25519();
    let envelope = Record::new(TARGET, 1)
        .with_salt("a")
        .encode(&keypair)
        .unwrap();

    let expected = Name::derive(&keypair.public(), "a");
    let _verified = VerifiedRecord::decode_for(&expected, &envelope).unwrap();

    let other = Name::derive(&keypair.public(), "b");
    let err = VerifiedRecord::decode_for(&other, &envelope).unwrap_err();
    assert!(matches!(
        err,
        RecordError::Authenticity(AuthenticityError::NameMismatch { .. })
    ));
}
