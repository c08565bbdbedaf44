//! Desktop helper: given two firmware images, extracts each one's
//! `GREETING:<text>\0` marker and prints both so a user can confirm an
//! update actually changes the message before uploading it. Not part of the
//! transfer protocol; reads raw bytes, no SDO/CRC/session logic.

use std::env;
use std::fs;
use std::process::ExitCode;

const GREETING_TAG: &[u8] = b"GREETING:";

fn extract_greeting(path: &str) -> Result<String, String> {
    let bytes = fs::read(path).map_err(|e| format!("unable to open {}: {}", path, e))?;
    if bytes.is_empty() {
        return Err(format!("{} is empty", path));
    }

    let tag_at = bytes
        .windows(GREETING_TAG.len())
        .position(|w| w == GREETING_TAG)
        .ok_or_else(|| format!("no {} marker in {}", String::from_utf8_lossy(GREETING_TAG), path))?;

    let start = tag_at + GREETING_TAG.len();
    let end = bytes[start..]
        .iter()
        .position(|&b| b == 0)
        .map(|n| start + n)
        .unwrap_or(bytes.len());

    String::from_utf8(bytes[start..end].to_vec()).map_err(|_| format!("greeting in {} is not valid UTF-8", path))
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: greeting-diff <current.bin> <candidate.bin>");
        return ExitCode::from(1);
    }

    let current = match extract_greeting(&args[1]) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(1);
        }
    };
    let candidate = match extract_greeting(&args[2]) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(1);
        }
    };

    println!("current firmware greeting : {}", current);
    println!("candidate firmware greeting: {}", candidate);
    if current == candidate {
        println!("no change in greeting");
    } else {
        println!("upload {} to change the greeting", args[2]);
    }
    ExitCode::from(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_greeting_up_to_nul() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut f, b"\x00\x01GREETING:hello world\0trailing garbage").unwrap();
        assert_eq!(extract_greeting(f.path().to_str().unwrap()).unwrap(), "hello world");
    }

    #[test]
    fn missing_marker_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut f, b"no marker here").unwrap();
        assert!(extract_greeting(f.path().to_str().unwrap()).is_err());
    }
}
