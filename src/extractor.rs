use crate::errors::AppResult;
use crate::models::ArchiveEntry;
use std::io::{self, Read};
use std::sync::Arc;
use tracing::debug;
use zip::read::{read_zipfile_from_stream, ZipFile};
use zip::CompressionMethod;

// End of central directory record, the only content of an archive without entries
const EMPTY_ARCHIVE_SIGNATURE: [u8; 4] = *b"PK\x05\x06";

/// Walks the entries of a ZIP stream in archive order.
///
/// The archive is read front to back from local file headers, so the input
/// does not need to be seekable and only the current entry is ever held open.
/// `visit` receives the entry metadata and a reader over its decompressed
/// content; whatever the visitor leaves unread is skipped before the next
/// entry is opened.
///
/// # Returns
///
/// The number of entries visited.
///
/// # Errors
///
/// Fails on a corrupt archive, on entries whose sizes are only stored in a
/// trailing data descriptor (general purpose flag bit 3, as written by
/// streaming ZIP writers such as Java's `ZipOutputStream`; these cannot be
/// read front to back), or when `visit` fails.
pub fn for_each_entry<R, F>(reader: &mut R, mut visit: F) -> AppResult<usize>
where
    R: Read,
    F: FnMut(Arc<ArchiveEntry>, &mut dyn Read) -> AppResult<()>,
{
    let mut head = [0u8; 4];
    let filled = read_head(reader, &mut head)?;
    if filled == 0 || head == EMPTY_ARCHIVE_SIGNATURE {
        return Ok(0);
    }
    let mut stream = (&head[..filled]).chain(reader);

    let mut count = 0;
    while let Some(mut file) = read_zipfile_from_stream(&mut stream)? {
        let entry = Arc::new(entry_metadata(&file));
        debug!(
            entry = %entry.name,
            size = entry.size,
            compressed_size = entry.compressed_size,
            "Reading ZIP entry"
        );
        visit(entry, &mut file)?;
        count += 1;
    }
    Ok(count)
}

fn read_head<R: Read>(reader: &mut R, head: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < head.len() {
        match reader.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn entry_metadata(file: &ZipFile) -> ArchiveEntry {
    let modified = file.last_modified();
    let comment = file.comment();
    ArchiveEntry {
        name: file.name().to_string(),
        modified: Some(format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            modified.year(),
            modified.month(),
            modified.day(),
            modified.hour(),
            modified.minute(),
            modified.second()
        )),
        size: file.size(),
        compressed_size: file.compressed_size(),
        is_dir: file.is_dir(),
        method: method_code(file.compression()),
        crc32: file.crc32(),
        comment: (!comment.is_empty()).then(|| comment.to_string()),
    }
}

/// The method number stored in the local file header (0 stored, 8 deflated).
fn method_code(method: CompressionMethod) -> u16 {
    // zip 0.6 has no other public mapping back to the header value
    #[allow(deprecated)]
    method.to_u16()
}
