//! Resolution of checkpoint locations.
//!
//! Weights may live on the HuggingFace Hub (`hf://owner/repo/file[@rev]`,
//! cached by `hf-hub`) or on local disk.

use anyhow::Result;
use hf_hub::api::sync::Api;
use log::info;
use std::path::PathBuf;

/// Fetch a remote checkpoint if needed and return its local path.
///
/// - `hf://owner/repo/path/to/file.safetensors`
/// - `hf://owner/repo/path/to/file.safetensors@revision`
/// - `/local/path/file.safetensors`
pub fn download_if_necessary(path: &str) -> Result<PathBuf> {
    if let Some(stripped) = path.strip_prefix("hf://") {
        let (repo_id, filename, revision) = parse_hf_path(stripped)?;
        info!("fetching {filename} from {repo_id}");
        let api = Api::new()?;
        let repo = match revision {
            Some(rev) => api.repo(hf_hub::Repo::with_revision(
                repo_id,
                hf_hub::RepoType::Model,
                rev,
            )),
            None => api.repo(hf_hub::Repo::model(repo_id)),
        };
        return Ok(repo.get(&filename)?);
    }

    if path.contains("://") {
        anyhow::bail!("Unsupported weights location: {path}");
    }

    let local = PathBuf::from(path);
    if !local.exists() {
        anyhow::bail!("No such file or directory: {path}");
    }
    Ok(local)
}

/// Split `owner/repo/path@rev` into repo id, file path and revision.
fn parse_hf_path(path: &str) -> Result<(String, String, Option<String>)> {
    let mut parts = path.split('/').collect::<Vec<_>>();
    if parts.len() < 3 || parts.iter().any(|part| part.is_empty()) {
        anyhow::bail!("Invalid hf:// path: {path}");
    }
    let repo_id = format!("{}/{}", parts.remove(0), parts.remove(0));
    let filename = parts.join("/");

    if let Some((file, rev)) = filename.split_once('@') {
        return Ok((repo_id, file.to_string(), Some(rev.to_string())));
    }
    Ok((repo_id, filename, None))
}
