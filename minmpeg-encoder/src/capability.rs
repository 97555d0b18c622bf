//! Codec capability registry
//!
//! Resolves a codec to the ordered list of backends that can encode it on
//! this host. In-process libav encoders are preferred; the ffmpeg executable
//! is the fallback. Probing never fails: anything that cannot be confirmed
//! is simply not a candidate.

use minmpeg_core::Codec;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// AV1 encoders, in order of preference
pub const AV1_ENCODERS: &[&str] = &["libsvtav1", "libaom-av1", "librav1e"];

/// Hardware or OS H.264 encoders that libav may be linked against
#[cfg(target_os = "macos")]
pub const PLATFORM_H264_ENCODERS: &[&str] = &["h264_videotoolbox"];
#[cfg(target_os = "windows")]
pub const PLATFORM_H264_ENCODERS: &[&str] = &["h264_mf"];
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub const PLATFORM_H264_ENCODERS: &[&str] = &[];

/// H.264 encoders accepted from the ffmpeg executable
pub const EXTERNAL_H264_ENCODERS: &[&str] = &["libx264"];

/// Name of the external encoder executable looked up in `PATH`
pub const FFMPEG_PROGRAM: &str = "ffmpeg";

/// A concrete encoder implementation for one codec
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Backend {
    /// libav encoder linked into this process
    InProcess { encoder: &'static str },
    /// ffmpeg executable fed raw frames on its standard input
    External {
        program: PathBuf,
        encoder: &'static str,
    },
}

impl Backend {
    /// libav name of the encoder this backend runs
    pub fn encoder_name(&self) -> &'static str {
        match self {
            Backend::InProcess { encoder } | Backend::External { encoder, .. } => *encoder,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Backend::External { .. })
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::InProcess { encoder } => write!(f, "{encoder} (in-process)"),
            Backend::External { program, encoder } => {
                write!(f, "{encoder} via {}", program.display())
            }
        }
    }
}

/// Outcome of an availability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available(Backend),
    Unavailable(String),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available(_))
    }

    /// The preferred backend, if any
    pub fn backend(&self) -> Option<&Backend> {
        match self {
            Availability::Available(backend) => Some(backend),
            Availability::Unavailable(_) => None,
        }
    }
}

/// Checks whether `codec` can be encoded on this host.
///
/// `backend_path` overrides the `PATH` lookup of the external encoder. The
/// answer depends only on the arguments and the state of the host.
pub fn check(codec: Codec, backend_path: Option<&Path>) -> Availability {
    match candidates(codec, backend_path).into_iter().next() {
        Some(backend) => Availability::Available(backend),
        None => Availability::Unavailable(unavailable_reason(codec, backend_path)),
    }
}

/// Every backend able to encode `codec`, best first
pub fn candidates(codec: Codec, backend_path: Option<&Path>) -> Vec<Backend> {
    let (in_process, external) = match codec {
        Codec::Av1 => (AV1_ENCODERS, AV1_ENCODERS),
        Codec::H264 => (PLATFORM_H264_ENCODERS, EXTERNAL_H264_ENCODERS),
    };

    let mut backends: Vec<Backend> = linked_encoders(in_process)
        .into_iter()
        .map(|encoder| Backend::InProcess { encoder })
        .collect();

    if let Some(program) = find_ffmpeg(backend_path) {
        if let Some(encoder) = probe_external(&program, external) {
            backends.push(Backend::External { program, encoder });
        }
    }

    tracing::debug!(%codec, candidates = ?backends, "resolved encoder backends");
    backends
}

/// Describes why no backend exists for `codec`
pub fn unavailable_reason(codec: Codec, backend_path: Option<&Path>) -> String {
    let (in_process, external) = match codec {
        Codec::Av1 => (AV1_ENCODERS, AV1_ENCODERS),
        Codec::H264 => (PLATFORM_H264_ENCODERS, EXTERNAL_H264_ENCODERS),
    };
    let linked = if in_process.is_empty() {
        "no in-process encoder on this platform".to_string()
    } else {
        format!("none of {} linked", in_process.join(", "))
    };
    let program = match backend_path {
        Some(path) => match find_ffmpeg(Some(path)) {
            Some(_) => format!("'{}' lacks {}", path.display(), external.join(", ")),
            None => format!("'{}' not found", path.display()),
        },
        None => match find_ffmpeg(None) {
            Some(found) => format!("'{}' lacks {}", found.display(), external.join(", ")),
            None => format!("{FFMPEG_PROGRAM} not found in PATH"),
        },
    };
    format!("no {codec} encoder available: {linked}; {program}")
}

/// libav encoders from `names` that this process can open
fn linked_encoders(names: &[&'static str]) -> Vec<&'static str> {
    if names.is_empty() || crate::init_ffmpeg().is_err() {
        return Vec::new();
    }
    names
        .iter()
        .copied()
        .filter(|name| ffmpeg_next::encoder::find_by_name(name).is_some())
        .collect()
}

/// Locates the ffmpeg executable: the explicit path when given, otherwise
/// the first match in `PATH`
pub fn find_ffmpeg(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => path.is_file().then(|| path.to_path_buf()),
        None => search_path(FFMPEG_PROGRAM),
    }
}

fn search_path(program: &str) -> Option<PathBuf> {
    let file_name = format!("{program}{}", std::env::consts::EXE_SUFFIX);
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
}

/// Asks `program` for its encoder list and returns the first of `wanted`
/// it reports. Any failure to run it means "not available".
pub fn probe_external(program: &Path, wanted: &[&'static str]) -> Option<&'static str> {
    let output = Command::new(program)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();

    let output = match output {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            tracing::debug!(program = %program.display(), status = %output.status, "encoder probe failed");
            return None;
        }
        Err(e) => {
            tracing::debug!(program = %program.display(), error = %e, "encoder probe failed");
            return None;
        }
    };

    let listing = String::from_utf8_lossy(&output.stdout);
    wanted
        .iter()
        .copied()
        .find(|name| listed_encoder(&listing, name))
}

/// Matches the encoder name column of `ffmpeg -encoders` output
fn listed_encoder(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Encoders:
 V..... = Video
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D libsvtav1            SVT-AV1(Scalable Video Technology for AV1) encoder (codec av1)
";

    #[test]
    fn test_listed_encoder() {
        assert!(listed_encoder(LISTING, "libx264"));
        assert!(listed_encoder(LISTING, "libsvtav1"));
        assert!(!listed_encoder(LISTING, "libaom-av1"));
        assert!(!listed_encoder(LISTING, "H.264"));
    }

    #[test]
    fn test_missing_explicit_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-ffmpeg");
        assert_eq!(find_ffmpeg(Some(&missing)), None);
        assert_eq!(probe_external(&missing, EXTERNAL_H264_ENCODERS), None);
        assert!(unavailable_reason(Codec::H264, Some(&missing)).contains("not found"));
    }

    #[test]
    fn test_directory_is_not_an_executable() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_ffmpeg(Some(dir.path())), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program_is_not_available() {
        assert_eq!(probe_external(Path::new("/bin/false"), AV1_ENCODERS), None);
    }

    #[test]
    fn test_check_is_repeatable() {
        for codec in [Codec::Av1, Codec::H264] {
            assert_eq!(check(codec, None), check(codec, None));
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    #[test]
    fn test_h264_with_missing_executable_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let availability = check(Codec::H264, Some(&dir.path().join("ffmpeg")));
        assert!(!availability.is_available());
    }

    #[test]
    fn test_backend_display() {
        let backend = Backend::External {
            program: PathBuf::from("/usr/bin/ffmpeg"),
            encoder: "libx264",
        };
        assert_eq!(backend.to_string(), "libx264 via /usr/bin/ffmpeg");
        assert_eq!(backend.encoder_name(), "libx264");
        assert!(backend.is_external());
        assert!(!Backend::InProcess { encoder: "libsvtav1" }.is_external());
    }
}
