use crate::config::PipelineConfig;
use crate::stage::{PipelineError, PipelineResult, Stage};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Downloads `url` into `file_path`, creating `directory` first when missing.
/// Returns the number of bytes written.
pub fn download(
    url: &str,
    file_path: &Path,
    directory: &Path,
    timeout: Duration,
) -> PipelineResult<u64> {
    if !directory.as_os_str().is_empty() && !directory.exists() {
        debug!("Creating data directory {}", directory.display());
        fs::create_dir_all(directory)?;
    }
    let parent = match file_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.exists() {
        fs::create_dir_all(parent)?;
    }

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()?;

    info!("Downloading {}", url);
    let mut response = client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    // The body lands next to the target and is renamed over it only once
    // complete; a truncated transfer leaves the target untouched.
    let mut file = NamedTempFile::new_in(parent)?;
    let bytes = response.copy_to(&mut file)?;
    file.flush()?;
    file.persist(file_path).map_err(|e| e.error)?;
    info!("Wrote {} bytes to {}", bytes, file_path.display());

    Ok(bytes)
}

pub struct ExtractStage;

impl ExtractStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ExtractStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for ExtractStage {
    fn name(&self) -> &str {
        "extract"
    }

    fn description(&self) -> &str {
        "Download the housing dataset"
    }

    fn run(&self, config: &PipelineConfig, out: &mut dyn Write) -> PipelineResult<()> {
        config.validated()?;
        writeln!(out, "Extracting data...")?;

        let url = config
            .source_url
            .as_deref()
            .ok_or_else(|| PipelineError::InvalidConfig {
                message: "No source URL configured; pass --url or set PIPELINE_SOURCE_URL"
                    .to_string(),
            })?;

        let bytes = download(
            url,
            &config.dataset_path,
            &config.data_dir,
            config.timeout(),
        )?;

        writeln!(out, "Extraction successful!")?;
        writeln!(
            out,
            "Saved {} bytes to {}",
            bytes,
            config.dataset_path.display()
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    const CSV: &str = "MedInc,HouseAge,AveRooms,AveBedrms,Population,AveOccup,Latitude,Longitude,MedHouseVal\n\
        8.3252,41.0,6.98,1.02,322.0,2.55,37.88,-122.23,4.526\n";

    #[test]
    fn test_extract_downloads_dataset() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/housing.csv")
            .with_status(200)
            .with_body(CSV)
            .create();

        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let config = PipelineConfig::default()
            .with_source_url(format!("{}/housing.csv", server.url()))
            .with_data_dir(&data_dir)
            .with_dataset_path(data_dir.join("housing.csv"));

        let mut out = Vec::new();
        ExtractStage::new().run(&config, &mut out).unwrap();

        mock.assert();
        let stdout = String::from_utf8(out).unwrap();
        assert!(stdout.contains("Extracting data..."));
        assert!(stdout.contains("Extraction successful!"));
        assert_eq!(
            fs::read_to_string(data_dir.join("housing.csv")).unwrap(),
            CSV
        );
    }

    #[test]
    fn test_extract_rejects_error_status() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/housing.csv")
            .with_status(404)
            .create();

        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default()
            .with_source_url(format!("{}/housing.csv", server.url()))
            .with_data_dir(dir.path())
            .with_dataset_path(dir.path().join("housing.csv"));

        let mut out = Vec::new();
        let result = ExtractStage::new().run(&config, &mut out);
        assert!(matches!(
            result,
            Err(PipelineError::HttpStatus { status: 404, .. })
        ));
        assert!(!dir.path().join("housing.csv").exists());
    }

    /// Serves one response that promises more bytes than it sends.
    fn truncating_server(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request);
            let head = "HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nConnection: close\r\n\r\n";
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(body.as_bytes()).unwrap();
        });
        format!("http://{}/housing.csv", addr)
    }

    #[test]
    fn test_truncated_download_leaves_no_dataset() {
        let url = truncating_server("MedInc,HouseAge\n1.0,2.0\n");
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default()
            .with_source_url(url)
            .with_data_dir(dir.path())
            .with_dataset_path(dir.path().join("housing.csv"));

        let mut out = Vec::new();
        let result = ExtractStage::new().run(&config, &mut out);

        assert!(matches!(result, Err(PipelineError::Http(_))));
        assert!(!dir.path().join("housing.csv").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_truncated_download_keeps_previous_dataset() {
        let url = truncating_server("MedInc\n1.0\n");
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("housing.csv");
        fs::write(&dataset, CSV).unwrap();

        let result = download(&url, &dataset, dir.path(), Duration::from_secs(5));

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&dataset).unwrap(), CSV);
    }

    #[test]
    fn test_extract_requires_source_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default()
            .with_data_dir(dir.path())
            .with_dataset_path(dir.path().join("housing.csv"));

        let mut out = Vec::new();
        let result = ExtractStage::new().run(&config, &mut out);
        assert!(matches!(result, Err(PipelineError::InvalidConfig { .. })));
        assert!(String::from_utf8(out)
            .unwrap()
            .contains("Extracting data..."));
    }
}
