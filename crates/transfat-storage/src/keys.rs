//! Shared key generation for object store backends.

use transfat_core::constants::MAX_FILE_NAME_LEN;
use uuid::Uuid;

/// Reduce a client-supplied file name to a safe single path segment.
///
/// Directory components are dropped, characters outside `[A-Za-z0-9._-]`
/// become `_`, leading dots are stripped and the result is capped at 255
/// characters. May return an empty string; callers reject that.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned
        .trim_start_matches('.')
        .chars()
        .take(MAX_FILE_NAME_LEN)
        .collect()
}

/// Key for a source upload. The timestamp plus random component keeps two
/// uploads of the same file name by the same user apart.
pub fn upload_key(user_id: Uuid, timestamp_millis: i64, file_name: &str) -> String {
    let short_id = &Uuid::new_v4().simple().to_string()[..8];
    format!(
        "videos/{}/{}-{}/{}",
        user_id, timestamp_millis, short_id, file_name
    )
}

pub fn hls_prefix(video_upload_id: Uuid) -> String {
    format!("videos/{}/hls", video_upload_id)
}

pub fn hls_key(video_upload_id: Uuid, file_name: &str) -> String {
    format!("{}/{}", hls_prefix(video_upload_id), file_name)
}

pub fn thumbnail_key(video_upload_id: Uuid) -> String {
    format!("videos/{}/thumbnail.jpg", video_upload_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories_and_odd_chars() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\videos\\my clip.mp4"), "my_clip.mp4");
        assert_eq!(sanitize_file_name(".hidden.mov"), "hidden.mov");
        assert_eq!(sanitize_file_name("..."), "");
        assert_eq!(sanitize_file_name(&"a".repeat(400)).len(), 255);
    }

    #[test]
    fn upload_keys_are_unique_per_call() {
        let user = Uuid::new_v4();
        let a = upload_key(user, 1_700_000_000_000, "clip.mp4");
        let b = upload_key(user, 1_700_000_000_000, "clip.mp4");
        assert_ne!(a, b);
        assert!(a.starts_with(&format!("videos/{}/1700000000000-", user)));
        assert!(a.ends_with("/clip.mp4"));
    }

    #[test]
    fn output_keys() {
        let id = Uuid::nil();
        assert_eq!(
            hls_key(id, "master.m3u8"),
            "videos/00000000-0000-0000-0000-000000000000/hls/master.m3u8"
        );
        assert_eq!(
            thumbnail_key(id),
            "videos/00000000-0000-0000-0000-000000000000/thumbnail.jpg"
        );
    }
}
