// ============================================================
// Layer 6 — Model Download
// ============================================================
// A serving host may start without weights on disk. When a
// download URL is configured, the checkpoint is fetched once
// and cached at its target path; later starts reuse the file.
//
// The body is streamed to `<path>.part`, flushed and synced, and
// renamed into place only after the download completed. A failed
// download leaves neither the target nor the `.part` file behind.

use anyhow::{bail, Context, Result};
use std::{
    fs,
    io::{self, Write},
    path::Path,
};

/// Make sure the model file at `path` exists, downloading it from
/// `url` when it is missing.
pub fn ensure_model(path: &Path, url: Option<&str>) -> Result<()> {
    if path.is_file() {
        return Ok(());
    }

    let Some(url) = url else {
        bail!(
            "Model file '{}' not found and no download URL configured",
            path.display()
        );
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create '{}'", parent.display()))?;
    }

    tracing::info!("Downloading model from {} ...", url);
    download(url, path)?;
    tracing::info!("Model saved to '{}'", path.display());
    Ok(())
}

fn download(url: &str, target: &Path) -> Result<()> {
    let partial = target.with_extension("part");

    let response = ureq::get(url)
        .call()
        .with_context(|| format!("Download request to {url} failed"))?;
    let status = response.status();
    if status != 200 {
        bail!("Unexpected response code {} for {}", status, url);
    }

    let written = write_body(response.into_reader(), &partial)
        .with_context(|| format!("Download from {url} was interrupted"))
        .and_then(|bytes| {
            fs::rename(&partial, target)
                .with_context(|| format!("Cannot move download into '{}'", target.display()))?;
            Ok(bytes)
        });

    match written {
        Ok(bytes) => {
            tracing::debug!("Downloaded {} bytes", bytes);
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(e)
        }
    }
}

fn write_body(mut reader: impl io::Read, partial: &Path) -> Result<u64> {
    let f = fs::File::create(partial)
        .with_context(|| format!("Cannot create '{}'", partial.display()))?;
    let mut writer = io::BufWriter::new(f);
    let bytes = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(bytes)
}
