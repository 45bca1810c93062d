//! JSON-lines plumbing shared by the pipeline stages.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Deserializes every non-blank line of `reader`; `source` names it in errors.
pub fn read_jsonl<T, R>(reader: R, source: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    R: BufRead,
{
    let mut items = Vec::new();
    for_each_jsonl(reader, source, |item| {
        items.push(item);
        Ok(())
    })?;
    Ok(items)
}

/// Streams every non-blank line of `reader` into `visit`.
pub fn for_each_jsonl<T, R, F>(reader: R, source: &str, mut visit: F) -> Result<usize>
where
    T: DeserializeOwned,
    R: BufRead,
    F: FnMut(T) -> Result<()>,
{
    let mut count = 0usize;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {source} line {}", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let item: T = serde_json::from_str(&line)
            .with_context(|| format!("invalid JSON in {source} at line {}", idx + 1))?;
        visit(item)?;
        count += 1;
    }
    Ok(count)
}

/// Writes one compact JSON object per line, returning the number written.
pub fn write_jsonl<'a, T, W, I>(writer: &mut W, items: I) -> Result<usize>
where
    T: Serialize + 'a,
    W: Write,
    I: IntoIterator<Item = &'a T>,
{
    let mut written = 0usize;
    for item in items {
        serde_json::to_writer(&mut *writer, item)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    Ok(written)
}

/// Opens a plain text file for line reading.
pub fn open_lines(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
    Ok(BufReader::new(file))
}

/// Opens a gzip-compressed file for line reading.
pub fn open_gz_lines(path: &Path) -> Result<BufReader<MultiGzDecoder<File>>> {
    let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
    Ok(BufReader::new(MultiGzDecoder::new(file)))
}

/// Creates `path` (and its parent directories) for buffered writing.
pub fn create_output(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {:?}", parent))?;
    }
    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    Ok(BufWriter::new(file))
}

/// Regular files in `dir` whose names end with `suffix`, sorted by filename.
pub fn list_shards(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("could not read shard dir {:?}", dir))?;
    let mut shards = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("could not list {:?}", dir))?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(suffix) {
            shards.push(entry.path());
        }
    }
    shards.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(shards)
}

/// Filename of `path` for log and report fields.
pub fn shard_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Cursor;

    fn temp_dir(test_name: &str) -> PathBuf {
        let mut root = std::env::temp_dir();
        root.push(format!("gifcities-jsonl-{test_name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).expect("create temp dir");
        root
    }

    #[test]
    fn reads_and_writes_lines() {
        let values = vec![serde_json::json!({"a": 1}), serde_json::json!({"a": 2})];
        let mut out = Vec::new();
        assert_eq!(write_jsonl(&mut out, &values).expect("write"), 2);

        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(text, "{\"a\":1}\n{\"a\":2}\n");

        let back: Vec<serde_json::Value> =
            read_jsonl(Cursor::new(format!("\n{text}\n")), "test").expect("read");
        assert_eq!(back, values);
    }

    #[test]
    fn reports_bad_line_number() {
        let err = read_jsonl::<serde_json::Value, _>(Cursor::new("{}\nnope\n"), "shard-a")
            .expect_err("invalid json");
        assert_eq!(err.to_string(), "invalid JSON in shard-a at line 2");
    }

    #[test]
    fn lists_shards_sorted_and_filtered() {
        let dir = temp_dir("list");
        for name in ["b.gz", "a.gz", "c.txt"] {
            fs::write(dir.join(name), b"").expect("write");
        }
        fs::create_dir_all(dir.join("d.gz")).expect("mkdir");

        let shards = list_shards(&dir, ".gz").expect("list");
        let names: Vec<String> = shards.iter().map(|p| shard_name(p)).collect();
        assert_eq!(names, vec!["a.gz", "b.gz"]);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn reads_gzip_lines() {
        let dir = temp_dir("gz");
        let path = dir.join("shard.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"{\"a\":1}\n").expect("encode");
        fs::write(&path, encoder.finish().expect("finish")).expect("write");

        let reader = open_gz_lines(&path).expect("open");
        let values: Vec<serde_json::Value> = read_jsonl(reader, "shard.gz").expect("read");
        assert_eq!(values, vec![serde_json::json!({"a": 1})]);
        fs::remove_dir_all(dir).ok();
    }
}
