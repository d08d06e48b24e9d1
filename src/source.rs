use std::io::Read;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use once_cell::sync::Lazy;
use reqwest::Client;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 12;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 6;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent("maskstock/0.2")
        .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        .build()
        .expect("failed to build HTTP client")
});

/// Load the raw observation table from a URL or local path and return plain
/// CSV bytes. The published table is a gzipped CSV, so payloads that start
/// with the gzip magic are decompressed transparently either way.
pub async fn load_source(source: &str, timeout: Duration) -> Result<Vec<u8>> {
    let payload = if is_remote(source) {
        fetch_bytes(source, timeout).await?
    } else {
        tokio::fs::read(source)
            .await
            .with_context(|| format!("failed reading source file: {source}"))?
    };
    decode_payload(payload).with_context(|| format!("failed decoding source payload: {source}"))
}

/// Download the remote table as-is, without decompressing, so the local file
/// mirrors the published object byte for byte. Returns the size written.
pub async fn download_to(url: &str, path: &Path, timeout: Duration) -> Result<u64> {
    let payload = fetch_bytes(url, timeout).await?;
    tokio::fs::write(path, &payload)
        .await
        .with_context(|| format!("failed writing {}", path.display()))?;
    Ok(payload.len() as u64)
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

async fn fetch_bytes(url: &str, timeout: Duration) -> Result<Vec<u8>> {
    let response = HTTP_CLIENT
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .with_context(|| format!("failed GET request: {url}"))?;
    let status = response.status();
    let body = response
        .bytes()
        .await
        .with_context(|| format!("failed reading response body: {url}"))?;
    if !status.is_success() {
        let preview: String = String::from_utf8_lossy(&body).chars().take(180).collect();
        return Err(anyhow!("GET {url} returned {status}: {preview}"));
    }
    Ok(body.to_vec())
}

fn decode_payload(payload: Vec<u8>) -> Result<Vec<u8>> {
    if !payload.starts_with(&GZIP_MAGIC) {
        return Ok(payload);
    }
    let mut decoded = Vec::new();
    GzDecoder::new(payload.as_slice())
        .read_to_end(&mut decoded)
        .context("failed decompressing gzip payload")?;
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::{decode_payload, is_remote, load_source};

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).expect("gzip write");
        encoder.finish().expect("gzip finish")
    }

    #[test]
    fn detects_remote_sources() {
        assert!(is_remote("https://storage.googleapis.com/momask/df_full.gz"));
        assert!(is_remote("http://localhost:8000/df_full.gz"));
        assert!(!is_remote("./data/df_full.gz"));
        assert!(!is_remote("/var/lib/maskstock/df_full.csv"));
    }

    #[test]
    fn plain_payloads_pass_through() {
        let payload = b"code,name\nA,x\n".to_vec();
        assert_eq!(decode_payload(payload.clone()).unwrap(), payload);
    }

    #[test]
    fn gzip_payloads_are_decompressed() {
        let csv = b"code,name\nA,x\n";
        assert_eq!(decode_payload(gzip(csv)).unwrap(), csv);
    }

    #[test]
    fn truncated_gzip_is_an_error() {
        let mut payload = gzip(b"code,name\nA,x\n");
        payload.truncate(6);
        assert!(decode_payload(payload).is_err());
    }

    #[tokio::test]
    async fn loads_local_files_with_and_without_gzip() {
        let dir = std::env::temp_dir();
        let csv = b"code,name\nA,x\n";

        let plain = dir.join(format!("maskstock-source-plain-{}.csv", std::process::id()));
        tokio::fs::write(&plain, csv).await.unwrap();
        let loaded = load_source(plain.to_str().unwrap(), std::time::Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(loaded, csv);
        tokio::fs::remove_file(&plain).await.ok();

        let packed = dir.join(format!("maskstock-source-gz-{}.gz", std::process::id()));
        tokio::fs::write(&packed, gzip(csv)).await.unwrap();
        let loaded = load_source(packed.to_str().unwrap(), std::time::Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(loaded, csv);
        tokio::fs::remove_file(&packed).await.ok();
    }

    #[tokio::test]
    async fn missing_local_file_is_an_error() {
        let result = load_source(
            "/nonexistent/maskstock/df_full.csv",
            std::time::Duration::from_secs(1),
        )
        .await;
        assert!(result.is_err());
    }
}
