//! Multi-request flows shared by the upload tests.

use axum_test::TestServer;
use bytes::Bytes;
use serde_json::json;
use transfat_core::models::{InitiateUploadResponse, PartETag, PartUrlResponse};

use super::auth::bearer;
use super::{api_path, local_path, TEST_CHUNK_SIZE};

/// Deterministic source bytes: byte `i` is `i % 251`.
pub fn video_bytes(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// The slice of `data` that part `part_number` (1-based) carries.
pub fn part_slice(data: &[u8], part_number: u32) -> Bytes {
    let chunk = TEST_CHUNK_SIZE as usize;
    let start = (part_number as usize - 1) * chunk;
    let end = (start + chunk).min(data.len());
    Bytes::copy_from_slice(&data[start..end])
}

pub async fn initiate(
    client: &TestServer,
    token: &str,
    file_name: &str,
    file_size: u64,
) -> InitiateUploadResponse {
    let res = client
        .post(&api_path("/uploads/initiate"))
        .add_header("Authorization", bearer(token))
        .json(&json!({
            "fileName": file_name,
            "fileSize": file_size,
            "contentType": "video/mp4"
        }))
        .await;
    assert_eq!(res.status_code(), 200, "initiate: {}", res.text());
    res.json()
}

pub async fn part_url(
    client: &TestServer,
    token: &str,
    upload_id: &str,
    part_number: u32,
) -> PartUrlResponse {
    let res = client
        .get(&api_path(&format!(
            "/uploads/presigned-url?uploadId={}&partNumber={}",
            urlencoding::encode(upload_id),
            part_number
        )))
        .add_header("Authorization", bearer(token))
        .await;
    assert_eq!(res.status_code(), 200, "presigned-url: {}", res.text());
    res.json()
}

/// PUT the bytes to a signed part URL and return the ETag header as sent.
pub async fn put_part(client: &TestServer, url: &str, body: Bytes) -> String {
    let res = client.put(&local_path(url)).bytes(body).await;
    assert_eq!(res.status_code(), 200, "part upload: {}", res.text());
    res.header("etag")
        .to_str()
        .expect("ETag header is ASCII")
        .to_string()
}

/// Request a URL for each listed part, upload it, and collect the ETags.
pub async fn upload_parts(
    client: &TestServer,
    token: &str,
    upload_id: &str,
    data: &[u8],
    part_numbers: &[u32],
) -> Vec<PartETag> {
    let mut parts = Vec::with_capacity(part_numbers.len());
    for &n in part_numbers {
        let signed = part_url(client, token, upload_id, n).await;
        let e_tag = put_part(client, &signed.url, part_slice(data, n)).await;
        parts.push(PartETag {
            part_number: n as i32,
            e_tag,
        });
    }
    parts
}

pub async fn complete(
    client: &TestServer,
    token: &str,
    upload_id: &str,
    parts: &[PartETag],
) -> axum_test::TestResponse {
    client
        .post(&api_path("/uploads/complete"))
        .add_header("Authorization", bearer(token))
        .json(&json!({ "uploadId": upload_id, "parts": parts }))
        .await
}

pub async fn set_status(
    client: &TestServer,
    token: &str,
    upload_id: &str,
    status: &str,
) -> axum_test::TestResponse {
    client
        .patch(&api_path("/uploads/status"))
        .add_header("Authorization", bearer(token))
        .json(&json!({ "uploadId": upload_id, "status": status }))
        .await
}

/// Initiate and upload every part, without completing.
pub async fn upload_all_parts(
    client: &TestServer,
    token: &str,
    data: &[u8],
) -> (InitiateUploadResponse, Vec<PartETag>) {
    let init = initiate(client, token, "clip.mp4", data.len() as u64).await;
    let numbers: Vec<u32> = (1..=init.part_count).collect();
    let parts = upload_parts(client, token, &init.upload_id, data, &numbers).await;
    (init, parts)
}
