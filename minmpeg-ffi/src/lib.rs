//! minmpeg C ABI
//!
//! Every operation returns a [`MinmpegResult`] by value. A non-zero `code`
//! is one of the error kinds and comes with a heap-allocated message that
//! the caller releases exactly once with [`minmpeg_free_result`].
//!
//! Codec and container cross the boundary as plain integers and are
//! validated here; unknown values are reported as invalid input.

use libc::{c_char, c_int, size_t};
use minmpeg::{Codec, Color, Container, ErrorKind, SlideEntry};
use std::ffi::{CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::ptr;

/// Outcome of a call: `code == 0` means success and `message` is NULL
#[repr(C)]
pub struct MinmpegResult {
    pub code: c_int,
    pub message: *mut c_char,
}

impl MinmpegResult {
    fn ok() -> Self {
        Self {
            code: 0,
            message: ptr::null_mut(),
        }
    }

    fn error(kind: ErrorKind, message: &str) -> Self {
        // Interior NULs would truncate the C string
        let text = CString::new(message.replace('\0', " ")).unwrap_or_default();
        Self {
            code: kind.code(),
            message: text.into_raw(),
        }
    }
}

/// One slide: image path and how long it stays on screen
#[repr(C)]
pub struct MinmpegSlideEntry {
    pub path: *const c_char,
    pub duration_ms: u32,
}

/// Failure while translating C arguments
struct ArgError(String);

fn report(result: Result<(), minmpeg::Error>) -> MinmpegResult {
    match result {
        Ok(()) => MinmpegResult::ok(),
        Err(e) => MinmpegResult::error(e.kind(), &e.to_string()),
    }
}

/// Runs `f`, turning argument errors into `InvalidInput` and panics into
/// `EncodeError`
fn guarded<F>(f: F) -> MinmpegResult
where
    F: FnOnce() -> Result<MinmpegResult, ArgError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(result)) => result,
        Ok(Err(ArgError(message))) => MinmpegResult::error(ErrorKind::InvalidInput, &message),
        Err(_) => MinmpegResult::error(ErrorKind::EncodeError, "internal panic in minmpeg"),
    }
}

unsafe fn path_arg(ptr: *const c_char, what: &str) -> Result<PathBuf, ArgError> {
    if ptr.is_null() {
        return Err(ArgError(format!("{what} is NULL")));
    }
    let bytes = CStr::from_ptr(ptr).to_bytes();

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        Ok(PathBuf::from(std::ffi::OsStr::from_bytes(bytes)))
    }
    #[cfg(not(unix))]
    {
        std::str::from_utf8(bytes)
            .map(PathBuf::from)
            .map_err(|_| ArgError(format!("{what} is not valid UTF-8")))
    }
}

unsafe fn optional_path_arg(ptr: *const c_char, what: &str) -> Result<Option<PathBuf>, ArgError> {
    if ptr.is_null() {
        Ok(None)
    } else {
        path_arg(ptr, what).map(Some)
    }
}

fn codec_arg(value: c_int) -> Result<Codec, ArgError> {
    Codec::try_from(value).map_err(|e| ArgError(e.to_string()))
}

fn container_arg(value: c_int) -> Result<Container, ArgError> {
    Container::try_from(value).map_err(|e| ArgError(e.to_string()))
}

/// Checks whether `codec` can be encoded on this system.
///
/// # Safety
///
/// `ffmpeg_path` must be NULL or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn minmpeg_available(codec: c_int, ffmpeg_path: *const c_char) -> MinmpegResult {
    guarded(|| {
        let codec = codec_arg(codec)?;
        let ffmpeg_path = optional_path_arg(ffmpeg_path, "ffmpeg path")?;
        Ok(report(minmpeg::availability(codec, ffmpeg_path.as_deref()).map(|_| ())))
    })
}

/// Creates a slideshow video from `entry_count` slides.
///
/// # Safety
///
/// `entries` must point to `entry_count` readable entries (it may be NULL
/// when `entry_count` is 0) whose paths are NUL-terminated strings.
/// `output_path` and `ffmpeg_path` must be NULL or NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn minmpeg_slideshow(
    entries: *const MinmpegSlideEntry,
    entry_count: size_t,
    output_path: *const c_char,
    container: c_int,
    codec: c_int,
    quality: u8,
    ffmpeg_path: *const c_char,
) -> MinmpegResult {
    guarded(|| {
        let container = container_arg(container)?;
        let codec = codec_arg(codec)?;
        let raw = if entry_count == 0 {
            &[][..]
        } else if entries.is_null() {
            return Err(ArgError("slide entries are NULL".into()));
        } else {
            std::slice::from_raw_parts(entries, entry_count)
        };
        let slides = raw
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                path_arg(entry.path, &format!("path of slide {i}"))
                    .map(|path| SlideEntry::new(path, entry.duration_ms))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let output_path = path_arg(output_path, "output path")?;
        let ffmpeg_path = optional_path_arg(ffmpeg_path, "ffmpeg path")?;

        Ok(report(
            minmpeg::slideshow(
                &slides,
                &output_path,
                container,
                codec,
                quality,
                ffmpeg_path.as_deref(),
            )
            .map(|_| ()),
        ))
    })
}

/// Combines two videos side by side; a NULL `background` means white.
///
/// # Safety
///
/// The path arguments must be NULL or NUL-terminated strings and
/// `background` must be NULL or point to a readable [`Color`].
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn minmpeg_juxtapose(
    left_path: *const c_char,
    right_path: *const c_char,
    output_path: *const c_char,
    container: c_int,
    codec: c_int,
    quality: u8,
    background: *const Color,
    ffmpeg_path: *const c_char,
) -> MinmpegResult {
    guarded(|| {
        let container = container_arg(container)?;
        let codec = codec_arg(codec)?;
        let left_path = path_arg(left_path, "left video path")?;
        let right_path = path_arg(right_path, "right video path")?;
        let output_path = path_arg(output_path, "output path")?;
        let background = background.as_ref().copied();
        let ffmpeg_path = optional_path_arg(ffmpeg_path, "ffmpeg path")?;

        Ok(report(
            minmpeg::juxtapose(
                &left_path,
                &right_path,
                &output_path,
                container,
                codec,
                quality,
                background,
                ffmpeg_path.as_deref(),
            )
            .map(|_| ()),
        ))
    })
}

/// Releases the message of `result` and resets it to NULL.
///
/// Call it once per returned result. Releasing a copy of a result whose
/// message was already released is undefined behavior.
///
/// # Safety
///
/// `result` must be NULL or point to a result returned by this library.
#[no_mangle]
pub unsafe extern "C" fn minmpeg_free_result(result: *mut MinmpegResult) {
    let Some(result) = result.as_mut() else {
        return;
    };
    if !result.message.is_null() {
        drop(CString::from_raw(result.message));
        result.message = ptr::null_mut();
    }
}

static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();

/// Library version as a static NUL-terminated string; never free it
#[no_mangle]
pub extern "C" fn minmpeg_version() -> *const c_char {
    VERSION.as_ptr() as *const c_char
}
