use hybrid_extract::artifacts::{ArtifactLayout, Publish, publish_new, replace_file, table_to_csv};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

fn cells(rows: &[&[Option<&str>]]) -> Vec<Vec<Option<String>>> {
    rows.iter()
        .map(|r| r.iter().map(|c| c.map(str::to_string)).collect())
        .collect()
}

fn names(dir: &Path) -> Vec<String> {
    let mut out: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    out.sort();
    out
}

#[test]
fn csv_quotes_and_pads() {
    let grid = cells(&[
        &[Some("a"), Some("b,c")],
        &[Some("say \"hi\""), None],
        &[Some("x")],
    ]);
    assert_eq!(
        table_to_csv(&grid, false),
        "a,\"b,c\"\n\"say \"\"hi\"\"\",\nx,\n"
    );
}

#[test]
fn csv_header_uses_column_indices() {
    let grid = cells(&[&[Some("a"), Some("b")]]);
    assert_eq!(table_to_csv(&grid, true), "0,1\na,b\n");
}

#[test]
fn paths_are_one_based_and_stable() {
    let layout = ArtifactLayout::under(Path::new("/out"));
    assert_eq!(
        layout.table_path("A", 1, 1),
        Path::new("/out/tables/A_page1_table1.csv")
    );
    assert_eq!(
        layout.image_path("A", 2, 3),
        Path::new("/out/images/A_page2_img3.png")
    );
    assert_eq!(layout.raster_path("A", 4), Path::new("/out/page_images/A_page4.png"));
    assert_eq!(layout.text_path("A"), Path::new("/out/texts/A.txt"));
    assert_eq!(layout.tei_path("A"), Path::new("/out/tei/A.tei.xml"));
}

#[test]
fn publish_skips_existing_target_without_producing() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("t.csv");
    std::fs::write(&target, "SENTINEL").unwrap();

    let res = publish_new(&target, |_| panic!("producer must not run")).unwrap();

    assert_eq!(res, Publish::Skipped);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "SENTINEL");
}

#[test]
fn failed_producer_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("sub").join("t.png");

    let res = publish_new(&target, |tmp| {
        std::fs::write(tmp, "half")?;
        anyhow::bail!("renderer crashed")
    });

    assert!(res.is_err());
    assert!(!target.exists());
    assert!(names(&dir.path().join("sub")).is_empty());
}

#[test]
fn racing_publishers_write_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("race.csv");
    let written = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for i in 0..8 {
            let target = &target;
            let written = &written;
            s.spawn(move || {
                let res = publish_new(target, |tmp| {
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    std::fs::write(tmp, format!("writer {i}"))?;
                    Ok(())
                })
                .unwrap();
                if res == Publish::Written {
                    written.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(written.load(Ordering::SeqCst), 1);
    assert!(std::fs::read_to_string(&target).unwrap().starts_with("writer "));
    assert_eq!(names(dir.path()), ["race.csv"]);
}

#[test]
fn replace_overwrites_in_one_step() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("texts").join("A.txt");

    replace_file(&target, b"first").unwrap();
    replace_file(&target, b"second").unwrap();

    assert_eq!(std::fs::read_to_string(&target).unwrap(), "second");
    assert_eq!(names(&dir.path().join("texts")), ["A.txt"]);
}
