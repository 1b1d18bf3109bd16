use std::env;
use std::fs;
use std::io::{self, BufWriter, Read, Write};

use record_logger::{is_binary, LogReader};

/// Decodes a binary log into JSON lines.
///
/// Reads the file named by the first argument, or stdin when there is none
/// or it is `-`. Text logs are copied through unchanged.
fn main() -> io::Result<()> {
    let data = match env::args().nth(1) {
        Some(path) if path != "-" => fs::read(&path)?,
        _ => {
            let mut buf = Vec::new();
            io::stdin().lock().read_to_end(&mut buf)?;
            buf
        }
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    if !is_binary(&data) {
        out.write_all(&data)?;
        return out.flush();
    }

    let mut reader = LogReader::new(&data);
    while let Some(entry) = reader.read_entry() {
        match entry {
            Ok(line) => writeln!(out, "{line}")?,
            Err(err) => {
                out.flush()?;
                return Err(io::Error::new(io::ErrorKind::InvalidData, err));
            }
        }
    }
    out.flush()
}
