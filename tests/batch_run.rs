mod common;

use common::synthetic_page::{STAMP_BLUE, blank_page, fill_rect, page_with_stamp};
use image::RgbImage;
use stamp_crop::core::config::ParallelPolicy;
use stamp_crop::prelude::*;
use std::path::Path;
use std::sync::Arc;

fn write_page(dir: &Path, name: &str, page: &RgbImage) {
    page.save(dir.join(name)).unwrap();
}

fn engine(selection: SelectionPolicy) -> Arc<StampDetectionEngine> {
    Arc::new(
        StampDetectionEngine::builder()
            .selection(selection)
            .build()
            .unwrap(),
    )
}

#[test]
fn batch_saves_crops_per_document() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    std::fs::create_dir(input.path().join("march")).unwrap();

    write_page(input.path(), "invoice.png", &page_with_stamp(200, 200, 100, 100));
    write_page(input.path(), "letter.jpg", &blank_page(300, 200));
    let mut two = page_with_stamp(100, 100, 100, 100);
    fill_rect(&mut two, 600, 150, 60, 60, STAMP_BLUE);
    write_page(&input.path().join("march"), "contract.png", &two);
    std::fs::write(input.path().join("notes.txt"), "not a document").unwrap();

    let report = BatchRunner::new(engine(SelectionPolicy::AllAboveThreshold { min_score: 0.0 }))
        .with_output_dir(output.path())
        .run(input.path())
        .unwrap();

    assert_eq!(report.document_count(), 3);
    assert_eq!(report.page_count(), 3);
    assert_eq!(report.pages_with_stamp(), 2);
    assert_eq!(report.pages_without_stamp(), 1);
    assert_eq!(report.failed_pages(), 0);
    assert_eq!(report.stamp_count(), 3);

    let single = output.path().join("invoice/invoice_page1_stamp.png");
    assert!(single.is_file());
    let crop = image::open(&single).unwrap().to_rgb8();
    assert_eq!(crop.dimensions(), (100, 100));

    assert!(output.path().join("march/contract/contract_page1_stamp1.png").is_file());
    assert!(output.path().join("march/contract/contract_page1_stamp2.png").is_file());
    assert!(!output.path().join("letter").exists());
}

#[test]
fn parallel_and_sequential_runs_agree() {
    let input = tempfile::tempdir().unwrap();
    for i in 0..6u32 {
        let page = page_with_stamp(100 + i * 40, 150, 80 + i * 5, 90);
        write_page(input.path(), &format!("scan_{i}.png"), &page);
    }

    let sequential = BatchRunner::new(engine(SelectionPolicy::SingleBest))
        .with_parallel_policy(
            ParallelPolicy::new()
                .with_max_threads(Some(1))
                .with_document_threshold(100),
        )
        .run(input.path())
        .unwrap();
    let parallel = BatchRunner::new(engine(SelectionPolicy::SingleBest))
        .with_parallel_policy(
            ParallelPolicy::new()
                .with_max_threads(Some(3))
                .with_document_threshold(1),
        )
        .run(input.path())
        .unwrap();

    let boxes = |report: &BatchReport| {
        report
            .documents
            .iter()
            .map(|d| (d.path.clone(), d.pages.iter().map(|p| p.stamps.clone()).collect::<Vec<_>>()))
            .map(|(path, stamps)| {
                let boxes = stamps.iter().flatten().map(|s| s.bbox).collect::<Vec<_>>();
                (path, boxes)
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(boxes(&sequential), boxes(&parallel));
    assert_eq!(parallel.pages_with_stamp(), 6);
}

#[test]
fn report_serializes_to_json() {
    let input = tempfile::tempdir().unwrap();
    write_page(input.path(), "a.png", &page_with_stamp(200, 200, 100, 100));

    let report = BatchRunner::new(engine(SelectionPolicy::SingleBest))
        .run(input.path())
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();

    let page = &json["documents"][0]["pages"][0];
    assert_eq!(page["outcome"], "found");
    assert_eq!(page["stamps"][0]["source"], "color_threshold");
    assert_eq!(page["stamps"][0]["bbox"], serde_json::json!([200, 200, 300, 300]));
}
