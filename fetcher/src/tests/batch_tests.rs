use crate::batch::{escape_separators, rewrite_import_steps, rewrite_steps};
use std::fs;

const BATCH_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<AmiBroker-Batch CompatibleVersion="1">
<Step>
<Action>LoadDatabase</Action>
<Param>D:\Invest\Database</Param>
</Step>
<Step>
<Action>ImportASCII</Action>
<Param>placeholder_1</Param>
</Step>
<Step>
<Action>ImportASCII</Action>
<Param/>
</Step>
<Step>
<Action>ImportASCII</Action>
<Param></Param>
</Step>
</AmiBroker-Batch>
"#;

fn params(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn test_rewrite_pairs_import_steps_positionally() {
    let rewritten = rewrite_steps(BATCH_XML, &params(&["first", "second", "third"])).unwrap();

    assert!(rewritten.contains("<Param>first</Param>"));
    assert!(rewritten.contains("<Param>second</Param>"));
    assert!(rewritten.contains("<Param>third</Param>"));
    // Document order is preserved
    let first = rewritten.find("<Param>first</Param>").unwrap();
    let second = rewritten.find("<Param>second</Param>").unwrap();
    let third = rewritten.find("<Param>third</Param>").unwrap();
    assert!(first < second && second < third);
    // The non-import step keeps its param
    assert!(rewritten.contains(r"<Param>D:\Invest\Database</Param>"));
    assert!(rewritten.contains("LoadDatabase"));
}

#[test]
fn test_rewrite_is_idempotent() {
    let values = params(&["first", "second", "third"]);
    let once = rewrite_steps(BATCH_XML, &values).unwrap();
    let twice = rewrite_steps(&once, &values).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_rewrite_fails_on_count_mismatch() {
    // 3 import steps, 2 params
    let result = rewrite_steps(BATCH_XML, &params(&["first", "second"]));
    let error = result.err().expect("mismatch must be an error");
    assert!(error.to_string().contains("is not equal to"));

    // 3 import steps, 4 params
    let result = rewrite_steps(BATCH_XML, &params(&["a", "b", "c", "d"]));
    assert!(result.is_err());
}

#[test]
fn test_rewrite_fails_on_import_step_without_param() {
    let xml = r#"<AmiBroker-Batch>
<Step>
<Action>ImportASCII</Action>
</Step>
</AmiBroker-Batch>
"#;
    let result = rewrite_steps(xml, &params(&["first"]));
    let error = result.err().expect("missing Param must be an error");
    assert!(error.to_string().contains("without a Param"));
}

#[test]
fn test_escape_separators_doubles_backslashes() {
    assert_eq!(
        escape_separators(r"D:\Invest\SLGD\CafeF.HSX.txt"),
        r"D:\\Invest\\SLGD\\CafeF.HSX.txt"
    );
    assert_eq!(escape_separators("/data/slgd/CafeF.HSX.txt"), "/data/slgd/CafeF.HSX.txt");
}

#[test]
fn test_rewrite_import_steps_writes_absolute_paths() {
    let dir = tempfile::tempdir().unwrap();
    let batch_file = dir.path().join("import.abb");
    fs::write(&batch_file, BATCH_XML).unwrap();

    let mut data_files = Vec::new();
    for name in ["CafeF.HNX.txt", "CafeF.HSX.txt", "CafeF.UPCOM.txt"] {
        let path = dir.path().join(name);
        fs::write(&path, "ticker,date,close\n").unwrap();
        data_files.push(path);
    }

    let rewritten = rewrite_import_steps(&batch_file, &data_files).unwrap();
    assert_eq!(rewritten, 3);

    let output = fs::read_to_string(&batch_file).unwrap();
    for file in &data_files {
        let expected = escape_separators(&fs::canonicalize(file).unwrap().to_string_lossy());
        assert!(output.contains(&expected), "missing param for {}", file.display());
    }
}

#[test]
fn test_mismatch_leaves_batch_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let batch_file = dir.path().join("import.abb");
    fs::write(&batch_file, BATCH_XML).unwrap();

    // Only 2 data files for 3 import steps
    let mut data_files = Vec::new();
    for name in ["CafeF.HNX.txt", "CafeF.HSX.txt"] {
        let path = dir.path().join(name);
        fs::write(&path, "ticker,date,close\n").unwrap();
        data_files.push(path);
    }

    let result = rewrite_import_steps(&batch_file, &data_files);
    assert!(result.is_err());
    assert_eq!(fs::read_to_string(&batch_file).unwrap(), BATCH_XML);
}
