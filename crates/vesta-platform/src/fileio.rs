// SPDX-License-Identifier: CEPL-1.0
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub fn file_size(path: &Path) -> io::Result<usize> {
    let len = std::fs::metadata(path)?.len();
    usize::try_from(len).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "file too large"))
}

/// Fill `buf` with the whole file. The buffer must be exactly the file's size
/// (see [`file_size`]); a shorter file fails with `UnexpectedEof`, a longer
/// one with `InvalidData`.
pub fn read_into(path: &Path, buf: &mut [u8]) -> io::Result<()> {
    let mut file = File::open(path)?;
    file.read_exact(buf)?;
    let mut probe = [0u8; 1];
    if file.read(&mut probe)? != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} is larger than the {} byte buffer", path.display(), buf.len()),
        ));
    }
    Ok(())
}
