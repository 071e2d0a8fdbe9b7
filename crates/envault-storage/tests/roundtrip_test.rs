//! End-to-end tests for the encryption client against an in-memory
//! operator: upload/download round-trips, wrong-key behavior, and the
//! decrypted-copy materialization path.

use opendal::Operator;

use envault_core::config::EncryptionConfig;
use envault_core::EnvaultError;
use envault_storage::EncryptionClient;

fn memory_operator() -> Operator {
    Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish()
}

fn test_client(master_key: Vec<u8>) -> (EncryptionClient, Operator, Operator) {
    let encrypted = memory_operator();
    let decrypted = memory_operator();
    let client = EncryptionClient::new(
        encrypted.clone(),
        decrypted.clone(),
        master_key,
        &EncryptionConfig::default(),
    )
    .expect("client construction");
    (client, encrypted, decrypted)
}

#[tokio::test]
async fn upload_download_roundtrip() {
    let (client, encrypted, _) = test_client(vec![0x42; 32]);
    let body = b"hello encrypted world! this object is compressed, enciphered, \
                 uploaded, downloaded, deciphered and verified."
        .to_vec();

    let summary = client.upload("docs/report.txt", body.as_slice()).await.unwrap();
    assert_eq!(summary.plaintext_bytes, body.len() as u64);
    assert!(summary.ciphertext_bytes > 0);

    // stored bytes are opaque ciphertext, not the plaintext
    let stored = encrypted
        .read("docs/report.txt")
        .await
        .unwrap()
        .to_bytes();
    assert_ne!(stored.as_ref(), body.as_slice());
    assert!(!stored
        .windows(b"encrypted world".len())
        .any(|w| w == b"encrypted world"));

    let mut restored = Vec::new();
    let n = client.download("docs/report.txt", &mut restored).await.unwrap();
    assert_eq!(n, body.len() as u64);
    assert_eq!(restored, body);
}

#[tokio::test]
async fn empty_object_roundtrip() {
    let (client, _, _) = test_client(vec![7u8; 16]);
    client.upload("empty", &b""[..]).await.unwrap();

    let mut restored = Vec::new();
    client.download("empty", &mut restored).await.unwrap();
    assert!(restored.is_empty());
}

#[tokio::test]
async fn megabyte_object_roundtrip() {
    let (client, _, _) = test_client(vec![0x42; 32]);
    let body: Vec<u8> = (0..1024 * 1024u32)
        .map(|i| (i.wrapping_mul(2654435761) >> 16) as u8)
        .collect();

    client.upload("bulk/blob", body.as_slice()).await.unwrap();

    let mut restored = Vec::new();
    client.download("bulk/blob", &mut restored).await.unwrap();
    assert_eq!(restored, body);
}

#[tokio::test]
async fn wrong_master_key_fails_closed() {
    let (writer_client, encrypted, decrypted) = test_client(vec![1u8; 32]);
    writer_client
        .upload("secret", &b"only for key one"[..])
        .await
        .unwrap();

    let reader_client = EncryptionClient::new(
        encrypted,
        decrypted,
        vec![2u8; 32],
        &EncryptionConfig::default(),
    )
    .unwrap();

    let mut out = Vec::new();
    let err = reader_client.download("secret", &mut out).await.unwrap_err();
    assert!(
        matches!(err, EnvaultError::EnvelopeDecryptionFailed),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn object_without_envelope_is_malformed() {
    let (client, encrypted, _) = test_client(vec![0u8; 32]);
    encrypted
        .write("raw-object", b"written outside the client".to_vec())
        .await
        .unwrap();

    let mut out = Vec::new();
    let err = client.download("raw-object", &mut out).await.unwrap_err();
    assert!(
        matches!(err, EnvaultError::EnvelopeMalformed { .. }),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn materialize_writes_decrypted_copy() {
    let (client, _, decrypted) = test_client(vec![9u8; 24]);
    let body = b"presign me, but decrypted".to_vec();
    client.upload("img/photo.png", body.as_slice()).await.unwrap();

    assert!(!decrypted.exists("img/photo.png").await.unwrap());
    let bytes = client.materialize_decrypted("img/photo.png").await.unwrap();
    assert_eq!(bytes, body.len() as u64);

    let copy = decrypted.read("img/photo.png").await.unwrap().to_bytes();
    assert_eq!(copy.as_ref(), body.as_slice());
}
