//! Streaming MD5 over a file path, with no temp files and no child
//! process.

use std::fs::File;
use std::io::Read;

use md5::{Digest, Md5};

use crate::error::Md5Error;

const CHUNK_SIZE: usize = 1024 * 1024;

/// Hash the file at `path` and return its MD5 digest as 32 lowercase hex
/// characters.
pub fn md5_hex_file(path: &std::path::Path) -> Result<String, Md5Error> {
    let mut file = File::open(path).map_err(Md5Error::FileOpen)?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf).map_err(Md5Error::Read)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn hashes_known_content() {
        let file = tempfile_with(b"hello world");
        let digest = md5_hex_file(file.path()).unwrap();
        assert_eq!(digest, "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(digest.len(), 32);
        file.close();
    }

    #[test]
    fn hashes_empty_file() {
        let file = tempfile_with(b"");
        let digest = md5_hex_file(file.path()).unwrap();
        assert_eq!(digest, "d41d8cd98f00b204e9800998ecf8427e");
        file.close();
    }

    #[test]
    fn hashes_content_spanning_multiple_chunks() {
        let data = vec![0xAB; CHUNK_SIZE * 2 + 17];
        let file = tempfile_with(&data);
        let digest = md5_hex_file(file.path()).unwrap();

        let mut hasher = Md5::new();
        hasher.update(&data);
        let expected: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();

        assert_eq!(digest, expected);
        file.close();
    }

    #[test]
    fn missing_file_is_file_open_error() {
        let err = md5_hex_file(std::path::Path::new("/nonexistent/path/to/nowhere"));
        assert!(matches!(err, Err(Md5Error::FileOpen(_))));
    }

    struct TempFile {
        path: std::path::PathBuf,
    }

    impl TempFile {
        fn path(&self) -> &std::path::Path {
            &self.path
        }

        fn close(self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn tempfile_with(data: &[u8]) -> TempFile {
        let path = std::env::temp_dir().join(format!(
            "wup-dfu-md5-test-{}-{}",
            std::process::id(),
            data.len()
        ));
        let mut f = File::create(&path).unwrap();
        f.write_all(data).unwrap();
        TempFile { path }
    }
}
