//! Per-request temporary audio files

use std::path::{Path, PathBuf};

use crate::Result;

/// An audio file under the temp directory, deleted when the guard drops
///
/// The guard owns the path whether or not anything was ever written to it,
/// so a request that fails before the file exists still drops cleanly.
#[derive(Debug)]
pub struct TempAudio {
    path: PathBuf,
}

impl TempAudio {
    /// Take ownership of `path`
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Location of the file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempAudio {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::trace!(path = %self.path.display(), "temp audio removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove temp audio"
            ),
        }
    }
}

/// Path for a downloaded voice note
#[must_use]
pub fn voice_path(dir: &Path, chat_id: &str, message_id: &str) -> PathBuf {
    dir.join(format!(
        "voice_{}_{}.ogg",
        file_component(chat_id),
        file_component(message_id)
    ))
}

/// Path for a synthesized reply with the given extension
#[must_use]
pub fn response_path(dir: &Path, chat_id: &str, message_id: &str, extension: &str) -> PathBuf {
    dir.join(format!(
        "response_{}_{}.{extension}",
        file_component(chat_id),
        file_component(message_id)
    ))
}

/// Create the temp directory if it does not exist
///
/// # Errors
///
/// Returns error if the directory cannot be created
pub async fn ensure_temp_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

/// Identifier made safe for use inside a file name
fn file_component(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
