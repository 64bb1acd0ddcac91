use std::path::{Path, PathBuf};

use anyhow::Result;
use image::{Rgb, RgbImage};
use tempfile::TempDir;

use birdcount::storage::{FrameRow, ObjectRow};
use birdcount::{
    run, BirdcountConfig, BirdcountError, BoundingBox, DetectionStore, DetectorSettings,
    FrameReport, RawDetection, StubBackend,
};

const BIRD_CLASS_INDEX: usize = 14;

fn bird() -> RawDetection {
    RawDetection {
        class_index: BIRD_CLASS_INDEX,
        confidence: 0.9,
        bbox: BoundingBox::new(100.0, 50.0, 170.0, 110.0),
    }
}

/// One bird on sampled frames 0 and 2, plus a person that must be filtered.
fn scripted_backend() -> StubBackend {
    let person = RawDetection {
        class_index: 0,
        confidence: 0.8,
        bbox: BoundingBox::new(1.0, 1.0, 10.0, 20.0),
    };
    StubBackend::new()
        .on_call(0, vec![bird(), person])
        .on_call(2, vec![bird()])
}

fn test_config(dir: &TempDir) -> BirdcountConfig {
    BirdcountConfig {
        db_path: dir.path().join("birds.db"),
        frames_dir: dir.path().join("output").join("frames"),
        chart_path: dir.path().join("output").join("chart.png"),
        classes_path: Path::new(env!("CARGO_MANIFEST_DIR")).join("data/classes.csv"),
        frame_interval: 2,
        detector: DetectorSettings {
            backend: "stub".to_string(),
            ..DetectorSettings::default()
        },
        ..BirdcountConfig::default()
    }
}

const VIDEO: &str = "stub://garden?frames=10&fps=1&width=200&height=120";

/// How far green stands out over red and blue; near zero on the gray stub
/// frames, high on the overlay after JPEG compression.
fn greenness(pixel: &Rgb<u8>) -> i32 {
    pixel[1] as i32 - pixel[0].max(pixel[2]) as i32
}

/// Strongest green along the left edge of the scripted bird box.
fn box_edge_greenness(image: &RgbImage) -> i32 {
    (99..=102)
        .flat_map(|x| (60..100).map(move |y| (x, y)))
        .map(|(x, y)| greenness(image.get_pixel(x, y)))
        .max()
        .unwrap_or(0)
}

/// Green pixels in the count overlay anchored at (10, 10).
fn overlay_text_pixels(image: &RgbImage) -> usize {
    (10..46)
        .flat_map(|y| (10..110).map(move |x| (x, y)))
        .filter(|&(x, y)| greenness(image.get_pixel(x, y)) > 60)
        .count()
}

fn table_contents(db_path: &Path) -> Result<(Vec<FrameRow>, Vec<ObjectRow>, i64)> {
    let store = DetectionStore::open(db_path)?;
    Ok((store.frames()?, store.objects()?, store.class_count()?))
}

#[test]
fn ten_frame_clip_sampled_every_second_frame() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(&dir);

    let mut reports: Vec<FrameReport> = Vec::new();
    let summary = run(
        &config,
        VIDEO,
        Box::new(scripted_backend()),
        &mut |report: &FrameReport| reports.push(report.clone()),
    )?;

    assert_eq!(summary.frames_sampled, 5);
    assert_eq!(summary.records, 2);
    assert_eq!(
        reports.iter().map(|r| r.timestamp_ms).collect::<Vec<_>>(),
        vec![0, 2000, 4000, 6000, 8000]
    );

    let mut images: Vec<PathBuf> = std::fs::read_dir(&config.frames_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    images.sort();
    assert_eq!(images.len(), 5);
    assert!(images
        .iter()
        .any(|p| p.ends_with("frame_2_at_4000.jpg")));

    let store = DetectionStore::open(&config.db_path)?;
    assert_eq!(store.class_count()?, 80);
    assert_eq!(store.frame_count()?, 2);
    assert_eq!(store.object_count()?, 2);
    assert_eq!(store.dangling_object_count()?, 0);
    let frames = store.frames()?;
    assert_eq!(frames[0].timestamp, "0");
    assert_eq!(frames[0].frame_number, 0);
    assert_eq!(frames[1].timestamp, "4000");
    assert_eq!(frames[1].frame_number, 2);
    let objects = store.objects()?;
    assert!(objects.iter().all(|o| o.class_id == BIRD_CLASS_INDEX as i64));
    assert_eq!(objects[0].bounding_box, [100.0, 50.0, 170.0, 110.0]);
    assert!((objects[0].confidence - 0.9).abs() < 1e-6);

    assert_eq!(summary.series.points(), &[(0, 1), (4, 1)]);
    assert!(config.chart_path.is_file());
    let chart = image::open(&config.chart_path)?.to_rgb8();
    assert_eq!(chart.dimensions(), (1200, 800));
    Ok(())
}

#[test]
fn running_twice_yields_identical_tables() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(&dir);

    run(&config, VIDEO, Box::new(scripted_backend()), &mut |_: &FrameReport| {})?;
    let first = table_contents(&config.db_path)?;
    std::fs::write(config.frames_dir.join("leftover.txt"), b"stale")?;

    run(&config, VIDEO, Box::new(scripted_backend()), &mut |_: &FrameReport| {})?;
    let second = table_contents(&config.db_path)?;

    assert_eq!(first, second);
    assert!(!config.frames_dir.join("leftover.txt").exists());
    assert_eq!(std::fs::read_dir(&config.frames_dir)?.count(), 5);
    Ok(())
}

#[test]
fn saved_frames_carry_boxes_and_count_overlay() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(&dir);
    run(&config, VIDEO, Box::new(scripted_backend()), &mut |_: &FrameReport| {})?;

    let expected = [
        ("frame_0_at_0.jpg", true),
        ("frame_1_at_2000.jpg", false),
        ("frame_2_at_4000.jpg", true),
        ("frame_3_at_6000.jpg", false),
        ("frame_4_at_8000.jpg", false),
    ];
    for (name, has_box) in expected {
        let image = image::open(config.frames_dir.join(name))?.to_rgb8();
        assert_eq!(image.dimensions(), (200, 120), "{}", name);

        let edge = box_edge_greenness(&image);
        if has_box {
            assert!(edge > 80, "{}: box edge greenness {}", name, edge);
        } else {
            assert!(edge < 30, "{}: unexpected green at box edge ({})", name, edge);
        }

        let text = overlay_text_pixels(&image);
        assert!(text > 20, "{}: only {} overlay text pixels", name, text);
    }
    Ok(())
}

#[test]
fn missing_video_leaves_store_untouched() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(&dir);
    let video = dir.path().join("nope.mp4");

    let err = run(
        &config,
        &video.to_string_lossy(),
        Box::new(scripted_backend()),
        &mut |_: &FrameReport| {},
    )
    .err()
    .expect("expected error");
    assert!(matches!(
        err.downcast_ref::<BirdcountError>(),
        Some(BirdcountError::VideoNotFound { .. })
    ));
    assert!(!config.db_path.exists());
    assert!(!config.frames_dir.exists());
    Ok(())
}

#[test]
fn unopenable_video_produces_empty_run() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(&dir);
    let video = dir.path().join("garbage.mp4");
    std::fs::write(&video, b"definitely not a video container")?;

    let summary = run(
        &config,
        &video.to_string_lossy(),
        Box::new(scripted_backend()),
        &mut |_: &FrameReport| {},
    )?;
    assert_eq!(summary.frames_sampled, 0);
    assert!(summary.series.is_empty());

    let store = DetectionStore::open(&config.db_path)?;
    assert_eq!(store.class_count()?, 80);
    assert_eq!(store.frame_count()?, 0);
    assert!(config.chart_path.is_file());
    Ok(())
}

#[test]
fn catalog_without_target_class_fails_population() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = test_config(&dir);
    config.classes_path = dir.path().join("classes.csv");
    std::fs::write(&config.classes_path, "class_id,class_name\n0,person\n")?;

    let err = run(&config, VIDEO, Box::new(scripted_backend()), &mut |_: &FrameReport| {})
        .err()
        .expect("expected error");
    assert!(matches!(
        err.downcast_ref::<BirdcountError>(),
        Some(BirdcountError::UnknownClassName { class_name }) if class_name == "bird"
    ));

    let store = DetectionStore::open(&config.db_path)?;
    assert_eq!(store.class_count()?, 0);
    assert_eq!(store.object_count()?, 0);
    Ok(())
}
