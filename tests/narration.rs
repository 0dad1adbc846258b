//! End-to-end narration against scripted doubles
//!
//! No piper or ffmpeg needed: the engine emits silence of a known length and
//! the backend stores PCM in a temp dir and tags in memory.

mod common;

use common::{book, config, listing, segment, FakeBackend, ScriptedEngine};
use hoerbuch::chapters::marker::{is_strictly_increasing, BookMetadata, Marker, Segment};
use hoerbuch::chapters::{read_markers, write_markers, ChapterMode, VorbisComments};
use hoerbuch::{ChapterOutcome, HoerbuchError, Narrator};
use tempfile::TempDir;

fn metadata() -> BookMetadata {
    BookMetadata::new("Das Buch", "Erika Muster")
}

fn narrator(convert_to_mp3: bool) -> Narrator<ScriptedEngine, FakeBackend> {
    Narrator::new(config(convert_to_mp3), ScriptedEngine::default(), FakeBackend::default())
}

fn offsets(markers: &[Marker]) -> Vec<f64> {
    markers.iter().map(|m| m.offset_seconds).collect()
}

#[tokio::test]
async fn test_markers_follow_written_samples() {
    let dir = TempDir::new().unwrap();
    let ogg = dir.path().join("book.ogg");
    let mut narrator = narrator(false);

    let timeline = narrator.synthesize_book(&book(), &metadata(), &ogg).await.unwrap();

    assert_eq!(offsets(&timeline.markers), vec![0.5, 5.5, 25.5]);
    assert_eq!(timeline.total_seconds, 32.5);
    assert!(is_strictly_increasing(&timeline.markers));

    // 32.5 s of mono 16-bit audio at 1 kHz
    assert_eq!(std::fs::metadata(&ogg).unwrap().len(), 32_500 * 2);

    let comments = narrator.backend().comments(&ogg).unwrap();
    assert_eq!(read_markers(&comments), Some(timeline.markers.clone()));
    assert_eq!(comments.get("title"), Some("Das Buch"));
    assert_eq!(comments.get("artist"), Some("Erika Muster"));
}

#[tokio::test]
async fn test_paragraphs_are_synthesized_separately() {
    let dir = TempDir::new().unwrap();
    let ogg = dir.path().join("book.ogg");
    let engine = ScriptedEngine::default();
    let mut narrator = Narrator::new(config(false), engine, FakeBackend::default());

    let segments = vec![Segment::new("Eins", "erster Absatz\n\nzweiter Absatz")];
    let timeline = narrator.synthesize_book(&segments, &metadata(), &ogg).await.unwrap();

    // Blank line boundaries change engine calls, not timing
    let chars = "erster Absatz".len() + "zweiter Absatz".len();
    let expected = 0.5 + chars as f64 / 10.0 + 5.0;
    assert!((timeline.total_seconds - expected).abs() < 1e-9);
}

#[tokio::test]
async fn test_existing_output_is_never_touched() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    let ogg = dir.path().join("book.ogg");
    std::fs::write(&input, "text").unwrap();
    std::fs::write(&ogg, b"previous narration").unwrap();
    let before = listing(dir.path());

    let mut narrator = narrator(false);
    let err = narrator.narrate(&input, &book(), &metadata()).await.unwrap_err();

    assert!(matches!(err, HoerbuchError::FileAlreadyExists(_)));
    assert_eq!(std::fs::read(&ogg).unwrap(), b"previous narration");
    assert_eq!(listing(dir.path()), before);
    assert_eq!(narrator.backend().containers_created(), 0);
    assert_eq!(narrator.backend().comment_writes(), 0);
}

#[tokio::test]
async fn test_synthesis_failure_removes_partial_container() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    std::fs::write(&input, "text").unwrap();

    let segments = vec![
        Segment::new("Intro", "alles gut"),
        Segment::new("Body", "boom goes the engine"),
    ];
    let mut narrator = Narrator::new(
        config(false),
        ScriptedEngine::failing_on("boom"),
        FakeBackend::default(),
    );

    let err = narrator.narrate(&input, &segments, &metadata()).await.unwrap_err();

    assert!(matches!(err, HoerbuchError::SynthesisFailed(_)));
    assert!(!dir.path().join("book.ogg").exists());
    assert_eq!(listing(dir.path()), vec!["book.txt"]);
}

#[tokio::test]
async fn test_mp3_output_gets_projected_chapters() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    std::fs::write(&input, "text").unwrap();

    let mut narrator = narrator(true);
    let output = narrator.narrate(&input, &book(), &metadata()).await.unwrap();

    assert_eq!(output, dir.path().join("book.mp3"));
    assert!(output.exists());
    assert!(!dir.path().join("book.ogg").exists());

    let tags = narrator.backend().chapter_tags(&output).unwrap();
    assert_eq!(tags.title, "Das Buch");
    assert_eq!(tags.artist, "Erika Muster");

    let frames: Vec<(&str, u64, u64, &str)> = tags
        .chapters
        .iter()
        .map(|c| (c.element_id.as_str(), c.start_ms, c.end_ms, c.title.as_str()))
        .collect();
    assert_eq!(
        frames,
        vec![
            ("ch0", 500, 5500, "Intro"),
            ("ch1", 5500, 25500, "Body"),
            ("ch2", 25500, 0, "Outro"),
        ]
    );
}

#[tokio::test]
async fn test_existing_ogg_markers_are_reused_for_mp3() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    let ogg = dir.path().join("book.ogg");
    std::fs::write(&input, "text").unwrap();
    std::fs::write(&ogg, vec![0u8; 2000]).unwrap();

    let markers = vec![Marker::new(0.5, "Intro"), Marker::new(1.25, "Body"), Marker::new(3.0, "Outro")];
    let mut comments = VorbisComments::new();
    write_markers(&mut comments, &markers, &metadata());

    let mut narrator = narrator(true);
    narrator.backend().set_comments(&ogg, comments);

    let output = narrator.narrate(&input, &book(), &metadata()).await.unwrap();

    assert_eq!(narrator.backend().containers_created(), 0);
    assert!(ogg.exists(), "reused OGG is kept");
    let starts: Vec<u64> = narrator
        .backend()
        .chapter_tags(&output)
        .unwrap()
        .chapters
        .iter()
        .map(|c| c.start_ms)
        .collect();
    assert_eq!(starts, vec![500, 1250, 3000]);
}

#[tokio::test]
async fn test_existing_ogg_without_markers_is_estimated() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    let ogg = dir.path().join("book.ogg");
    std::fs::write(&input, "text").unwrap();
    // 15.5 s at 1 kHz: 10 s of speech between the padding
    std::fs::write(&ogg, vec![0u8; 15_500 * 2]).unwrap();

    let segments = vec![segment("A", 10), segment("B", 30), segment("C", 60)];
    let narrator = narrator(true);

    let markers = narrator.recover_markers(&ogg, &segments).await;

    let expected = [0.5, 1.5, 4.5];
    assert_eq!(markers.len(), 3);
    for (marker, expected) in markers.iter().zip(expected) {
        assert!((marker.offset_seconds - expected).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_conversion_failure_keeps_ogg_and_removes_partial_mp3() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    std::fs::write(&input, "text").unwrap();

    let backend = FakeBackend::failing_transcode();
    let mut narrator = Narrator::new(config(true), ScriptedEngine::default(), backend);

    let err = narrator.narrate(&input, &book(), &metadata()).await.unwrap_err();

    assert!(matches!(err, HoerbuchError::ConversionFailed(_)));
    assert!(dir.path().join("book.ogg").exists());
    assert!(!dir.path().join("book.mp3").exists());
}

#[tokio::test]
async fn test_tagging_failure_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    std::fs::write(&input, "text").unwrap();

    let backend = FakeBackend::failing_tags();
    let mut narrator = Narrator::new(config(true), ScriptedEngine::default(), backend);

    let output = narrator.narrate(&input, &book(), &metadata()).await.unwrap();

    assert!(output.exists());
    assert!(narrator.backend().chapter_tags(&output).is_none());
}

#[tokio::test]
async fn test_direct_chapter_writes_one_titled_file() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    std::fs::write(&input, "text").unwrap();

    let mut narrator = narrator(false);
    let mut no_input: &[u8] = b"";
    let outcome = narrator
        .run_chapter_mode(ChapterMode::DirectChapter(2), &input, &book(), &metadata(), &mut no_input)
        .await
        .unwrap();

    let expected = dir.path().join("book_02_Body.ogg");
    assert_eq!(outcome, ChapterOutcome::Chapter(expected.clone()));
    assert_eq!(std::fs::metadata(&expected).unwrap().len(), (500 + 20_000 + 5_000) * 2);

    let comments = narrator.backend().comments(&expected).unwrap();
    assert_eq!(comments.get("title"), Some("Body"));
    assert_eq!(comments.get("artist"), Some("Erika Muster"));
    assert_eq!(read_markers(&comments), None);
}

#[tokio::test]
async fn test_direct_chapter_refuses_existing_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    let existing = dir.path().join("book_01_Intro.ogg");
    std::fs::write(&input, "text").unwrap();
    std::fs::write(&existing, b"keep me").unwrap();

    let mut narrator = narrator(false);
    let mut no_input: &[u8] = b"";
    let err = narrator
        .run_chapter_mode(ChapterMode::DirectChapter(1), &input, &book(), &metadata(), &mut no_input)
        .await
        .unwrap_err();

    assert!(matches!(err, HoerbuchError::FileAlreadyExists(_)));
    assert_eq!(std::fs::read(&existing).unwrap(), b"keep me");
    assert_eq!(narrator.backend().containers_created(), 0);
}

#[tokio::test]
async fn test_split_all_skips_existing_and_continues_past_failures() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    std::fs::write(&input, "text").unwrap();
    std::fs::write(dir.path().join("book_01_Eins.ogg"), b"done earlier").unwrap();

    let segments = vec![
        Segment::new("Eins", "erstes"),
        Segment::new("Zwei: Der Knall!", "boom"),
        Segment::new("Drei", "drittes"),
    ];
    let mut narrator = Narrator::new(
        config(false),
        ScriptedEngine::failing_on("boom"),
        FakeBackend::default(),
    );

    let mut answer: &[u8] = b"s\n";
    let outcome = narrator
        .run_chapter_mode(ChapterMode::Interactive, &input, &segments, &metadata(), &mut answer)
        .await
        .unwrap();

    let ChapterOutcome::Split(report) = outcome else {
        panic!("expected split report, got {:?}", outcome);
    };
    assert_eq!(report.skipped, vec![dir.path().join("book_01_Eins.ogg")]);
    assert_eq!(report.written, vec![dir.path().join("book_03_Drei.ogg")]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, 2);

    assert_eq!(
        listing(dir.path()),
        vec!["book.txt", "book_01_Eins.ogg", "book_03_Drei.ogg"]
    );
    assert_eq!(std::fs::read(dir.path().join("book_01_Eins.ogg")).unwrap(), b"done earlier");
}

#[tokio::test]
async fn test_direct_chapter_mp3_leaves_only_the_mp3() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    std::fs::write(&input, "text").unwrap();

    let mut narrator = narrator(true);
    let mut no_input: &[u8] = b"";
    let outcome = narrator
        .run_chapter_mode(ChapterMode::DirectChapter(2), &input, &book(), &metadata(), &mut no_input)
        .await
        .unwrap();

    let mp3 = dir.path().join("book_02_Body.mp3");
    assert_eq!(outcome, ChapterOutcome::Chapter(mp3.clone()));
    assert_eq!(listing(dir.path()), vec!["book.txt", "book_02_Body.mp3"]);

    let tags = narrator.backend().chapter_tags(&mp3).unwrap();
    assert_eq!(tags.title, "Body");
    assert_eq!(tags.artist, "Erika Muster");
    assert!(tags.chapters.is_empty());

    std::fs::remove_file(&mp3).unwrap();
    let mut no_input: &[u8] = b"";
    let again = narrator
        .run_chapter_mode(ChapterMode::DirectChapter(2), &input, &book(), &metadata(), &mut no_input)
        .await
        .unwrap();
    assert_eq!(again, ChapterOutcome::Chapter(mp3));
    assert_eq!(listing(dir.path()), vec!["book.txt", "book_02_Body.mp3"]);
}

#[tokio::test]
async fn test_interactive_chapter_number_with_mp3() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    std::fs::write(&input, "text").unwrap();

    let mut narrator = narrator(true);
    let mut answer: &[u8] = b"1\n";
    let outcome = narrator
        .run_chapter_mode(ChapterMode::Interactive, &input, &book(), &metadata(), &mut answer)
        .await
        .unwrap();

    assert_eq!(outcome, ChapterOutcome::Chapter(dir.path().join("book_01_Intro.mp3")));
    assert_eq!(listing(dir.path()), vec!["book.txt", "book_01_Intro.mp3"]);
    assert_eq!(narrator.backend().transcodes(), 1);
}

#[tokio::test]
async fn test_split_all_conversion_failure_leaves_no_chapter_files() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    std::fs::write(&input, "text").unwrap();

    let segments = vec![Segment::new("Eins", "erstes")];
    let mut narrator = Narrator::new(
        config(true),
        ScriptedEngine::default(),
        FakeBackend::failing_transcode(),
    );

    for _ in 0..2 {
        let mut answer: &[u8] = b"s\n";
        let outcome = narrator
            .run_chapter_mode(ChapterMode::Interactive, &input, &segments, &metadata(), &mut answer)
            .await
            .unwrap();

        let ChapterOutcome::Split(report) = outcome else {
            panic!("expected split report, got {:?}", outcome);
        };
        assert!(report.written.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, 1);
        assert!(report.failed[0].1.contains("encoder exploded"), "{}", report.failed[0].1);
        assert_eq!(listing(dir.path()), vec!["book.txt"]);
    }
    assert_eq!(narrator.backend().transcodes(), 2);
}

#[tokio::test]
async fn test_split_all_mp3_removes_intermediate_oggs() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    std::fs::write(&input, "text").unwrap();

    let mut narrator = narrator(true);
    let mut answer: &[u8] = b"S\n";
    let outcome = narrator
        .run_chapter_mode(ChapterMode::Interactive, &input, &book(), &metadata(), &mut answer)
        .await
        .unwrap();

    let ChapterOutcome::Split(report) = outcome else {
        panic!("expected split report, got {:?}", outcome);
    };
    assert_eq!(report.written.len(), 3);
    assert!(report.failed.is_empty());
    assert_eq!(
        listing(dir.path()),
        vec!["book.txt", "book_01_Intro.mp3", "book_02_Body.mp3", "book_03_Outro.mp3"]
    );
}

#[tokio::test]
async fn test_container_taken_during_creation_is_left_alone() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    std::fs::write(&input, "text").unwrap();

    let mut narrator = Narrator::new(
        config(false),
        ScriptedEngine::default(),
        FakeBackend::losing_container_race(),
    );
    let err = narrator.narrate(&input, &book(), &metadata()).await.unwrap_err();

    assert!(matches!(err, HoerbuchError::FileAlreadyExists(_)));
    assert_eq!(std::fs::read(dir.path().join("book.ogg")).unwrap(), b"someone else");
}

#[tokio::test]
async fn test_interactive_single_chapter() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    std::fs::write(&input, "text").unwrap();

    let mut narrator = narrator(false);
    let mut answer: &[u8] = b" 3 \n";
    let outcome = narrator
        .run_chapter_mode(ChapterMode::Interactive, &input, &book(), &metadata(), &mut answer)
        .await
        .unwrap();

    assert_eq!(outcome, ChapterOutcome::Chapter(dir.path().join("book_03_Outro.ogg")));
}

#[tokio::test]
async fn test_interactive_combine_all() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");
    std::fs::write(&input, "text").unwrap();

    let mut narrator = narrator(false);
    let mut answer: &[u8] = b"A\n";
    let outcome = narrator
        .run_chapter_mode(ChapterMode::Interactive, &input, &book(), &metadata(), &mut answer)
        .await
        .unwrap();

    let ogg = dir.path().join("book.ogg");
    assert_eq!(outcome, ChapterOutcome::Book(ogg.clone()));
    let markers = read_markers(&narrator.backend().comments(&ogg).unwrap()).unwrap();
    assert_eq!(offsets(&markers), vec![0.5, 5.5, 25.5]);
}

#[tokio::test]
async fn test_interactive_rejects_other_input_without_side_effects() {
    for answer in [&b"x\n"[..], &b"0\n"[..], &b"99\n"[..], &b"-1\n"[..], &b""[..]] {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("book.txt");
        std::fs::write(&input, "text").unwrap();

        let mut narrator = narrator(false);
        let mut reader = answer;
        let outcome = narrator
            .run_chapter_mode(ChapterMode::Interactive, &input, &book(), &metadata(), &mut reader)
            .await
            .unwrap();

        assert_eq!(outcome, ChapterOutcome::Cancelled);
        assert_eq!(listing(dir.path()), vec!["book.txt"]);
        assert_eq!(narrator.backend().containers_created(), 0);
    }
}

#[tokio::test]
async fn test_empty_document_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("book.txt");

    let mut narrator = narrator(false);
    let mut no_input: &[u8] = b"";
    let err = narrator
        .run_chapter_mode(ChapterMode::NoChapterMode, &input, &[], &metadata(), &mut no_input)
        .await
        .unwrap_err();

    assert!(matches!(err, HoerbuchError::EmptyDocument));
}
