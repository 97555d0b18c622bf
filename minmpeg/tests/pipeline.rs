use image::{Rgb, RgbImage};
use minmpeg::{Codec, Color, Container, ErrorKind, SlideEntry};
use minmpeg_decoder::{VideoReader, VideoSource};
use std::path::{Path, PathBuf};

fn av1_available() -> bool {
    match minmpeg::availability(Codec::Av1, None) {
        Ok(_) => true,
        Err(e) => {
            eprintln!("skipping: {e}");
            false
        }
    }
}

fn write_png(dir: &Path, name: &str, width: u32, height: u32, rgb: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(width, height, Rgb(rgb)).save(&path).unwrap();
    path
}

fn noisy_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_fn(128, 96, |x, y| {
        let v = (x * 31 + y * 17 + (x * y) % 23) as u8;
        Rgb([v, v.wrapping_mul(3), 255 - v])
    })
    .save(&path)
    .unwrap();
    path
}

/// Decodes every frame, or `None` when this host cannot decode the file
fn read_back(path: &Path) -> Option<(minmpeg::Geometry, Vec<minmpeg::PixelFrame>)> {
    let reader = match VideoReader::open(path) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("cannot read back {}: {e}", path.display());
            return None;
        }
    };
    let geometry = reader.geometry();
    let frames: Result<Vec<_>, _> = reader.map(|f| f.map(|d| d.frame)).collect();
    match frames {
        Ok(frames) => Some((geometry, frames)),
        Err(e) => {
            eprintln!("cannot decode {}: {e}", path.display());
            None
        }
    }
}

fn close_to(actual: Color, expected: Color) -> bool {
    let diff = |a: u8, b: u8| (a as i16 - b as i16).abs();
    diff(actual.r, expected.r) < 40 && diff(actual.g, expected.g) < 40 && diff(actual.b, expected.b) < 40
}

#[test]
fn test_webm_h264_is_mismatch_before_anything_else() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.webm");

    // Even with otherwise invalid arguments the pair is reported first
    let err = minmpeg::slideshow(&[], &output, Container::WebM, Codec::H264, 200, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContainerCodecMismatch);

    let missing = dir.path().join("missing.mp4");
    let err = minmpeg::juxtapose(
        &missing,
        &missing,
        &output,
        Container::WebM,
        Codec::H264,
        50,
        None,
        Some(dir.path().join("no-ffmpeg").as_path()),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContainerCodecMismatch);
    assert!(!output.exists());
}

#[test]
fn test_invalid_slideshow_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let image = write_png(dir.path(), "a.png", 64, 64, [0, 0, 0]);

    let err = minmpeg::slideshow(&[], &output, Container::Mp4, Codec::Av1, 50, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let zero = [SlideEntry::new(&image, 0)];
    let err = minmpeg::slideshow(&zero, &output, Container::Mp4, Codec::Av1, 50, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let ok = [SlideEntry::new(&image, 1000)];
    let err = minmpeg::slideshow(&ok, &output, Container::Mp4, Codec::Av1, 101, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = minmpeg::slideshow(&ok, Path::new(""), Container::Mp4, Codec::Av1, 50, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(!output.exists());
}

#[test]
fn test_availability_is_repeatable() {
    for codec in [Codec::Av1, Codec::H264] {
        let first = minmpeg::availability(codec, None).map_err(|e| e.kind());
        let second = minmpeg::availability(codec, None).map_err(|e| e.kind());
        assert_eq!(first, second);
        if let Err(kind) = first {
            assert_eq!(kind, ErrorKind::CodecUnavailable);
        }
    }
}

#[test]
fn test_unreadable_slide_is_io_error() {
    if !av1_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.webm");
    let entries = [SlideEntry::new(dir.path().join("missing.png"), 1000)];

    let err = minmpeg::slideshow(&entries, &output, Container::WebM, Codec::Av1, 50, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoError);
    assert!(!output.exists());
}

#[test]
fn test_broken_later_slide_leaves_no_output() {
    if !av1_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.webm");
    let broken = dir.path().join("broken.png");
    std::fs::write(&broken, b"").unwrap();
    let entries = [
        SlideEntry::new(write_png(dir.path(), "a.png", 64, 64, [255, 0, 0]), 500),
        SlideEntry::new(&broken, 500),
    ];

    let err = minmpeg::slideshow(&entries, &output, Container::WebM, Codec::Av1, 50, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecodeError);

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".webm"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn test_slideshow_three_seconds() {
    if !av1_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("slides.webm");
    let entries = [
        SlideEntry::new(write_png(dir.path(), "r.png", 96, 64, [255, 0, 0]), 1000),
        SlideEntry::new(write_png(dir.path(), "g.png", 64, 64, [0, 255, 0]), 1000),
        SlideEntry::new(write_png(dir.path(), "b.png", 96, 64, [0, 0, 255]), 1000),
    ];

    let summary =
        minmpeg::slideshow(&entries, &output, Container::WebM, Codec::Av1, 70, None).unwrap();
    assert_eq!(summary.frames, 90);
    assert!(summary.bytes > 0);
    assert!(output.is_file());

    if let Some((geometry, frames)) = read_back(&output) {
        assert_eq!(geometry, minmpeg::Geometry::new(96, 64));
        assert!((89..=91).contains(&frames.len()), "{} frames", frames.len());
        assert!(close_to(frames[10].pixel(48, 32), Color::new(255, 0, 0)));
        assert!(close_to(frames[45].pixel(48, 32), Color::new(0, 255, 0)));
        assert!(close_to(frames[80].pixel(48, 32), Color::new(0, 0, 255)));
    }
}

#[test]
fn test_juxtapose_pads_and_holds() {
    if !av1_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let left = dir.path().join("left.webm");
    let right = dir.path().join("right.webm");
    let output = dir.path().join("side.mp4");

    let red = [SlideEntry::new(write_png(dir.path(), "red.png", 100, 100, [255, 0, 0]), 2000)];
    let blue = [SlideEntry::new(write_png(dir.path(), "blue.png", 50, 80, [0, 0, 255]), 1000)];
    if let Err(e) = minmpeg::slideshow(&red, &left, Container::WebM, Codec::Av1, 80, None)
        .and_then(|_| minmpeg::slideshow(&blue, &right, Container::WebM, Codec::Av1, 80, None))
    {
        eprintln!("skipping: cannot build fixtures: {e}");
        return;
    }
    if read_back(&left).is_none() || read_back(&right).is_none() {
        return;
    }

    let background = Color::new(255, 255, 255);
    let summary = minmpeg::juxtapose(
        &left,
        &right,
        &output,
        Container::Mp4,
        Codec::Av1,
        80,
        Some(background),
        None,
    )
    .unwrap();
    assert!((59..=61).contains(&summary.frames), "{} frames", summary.frames);

    let Some((geometry, frames)) = read_back(&output) else {
        return;
    };
    assert_eq!(geometry, minmpeg::Geometry::new(150, 100));
    for index in [5, 25, 40, frames.len() - 1] {
        let frame = &frames[index];
        assert!(close_to(frame.pixel(50, 50), Color::new(255, 0, 0)));
        assert!(close_to(frame.pixel(125, 40), Color::new(0, 0, 255)));
        assert!(close_to(frame.pixel(125, 95), background));
    }
}

#[test]
fn test_higher_quality_is_not_smaller() {
    if !av1_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let image = noisy_png(dir.path(), "noise.png");
    let entries = [SlideEntry::new(&image, 500)];

    let high = minmpeg::slideshow(&entries, &dir.path().join("q90.mp4"), Container::Mp4, Codec::Av1, 90, None)
        .unwrap();
    let low = minmpeg::slideshow(&entries, &dir.path().join("q30.mp4"), Container::Mp4, Codec::Av1, 30, None)
        .unwrap();
    assert!(high.bytes >= low.bytes, "{} < {}", high.bytes, low.bytes);
}
