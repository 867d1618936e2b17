//! Run-list plumbing shared by the CHP, PAP and section tables.
//!
//! A bin table (PLCFBTE) is a plex whose 4-byte structures are FKP page
//! numbers; the page lives at `pn * 512` in the WordDocument stream. Once
//! loaded, every table is a flat `Vec` of character-domain runs edited with
//! the functions below.
//!
//! Based on Apache POI's CHPBinTable and PAPBinTable.

use super::fkp::{FKP_PAGE_SIZE, PackedPage};
use crate::common::binary::read_u32_le;
use crate::common::error::{Error, Result};
use crate::ole::plcf::{PlexOfCps, u32_struct};
use crate::ole::property_node::{GenericPropertyNode, PropertyNode};
use tracing::{debug, trace};

/// PnFkp: bits 0-21 hold the page number, the rest must be ignored.
const PN_MASK: u32 = 0x003F_FFFF;

/// Byte offsets of the FKP pages listed by the bin table at
/// `offset..offset + size` of the table stream, in page order.
pub fn page_offsets(table_stream: &[u8], offset: usize, size: usize) -> Result<Vec<usize>> {
    let plex = PlexOfCps::parse(table_stream, offset, size, 4)?;
    plex.properties()
        .iter()
        .map(|node| -> Result<usize> {
            let pn = read_u32_le(node.payload(), 0)? & PN_MASK;
            Ok(pn as usize * FKP_PAGE_SIZE)
        })
        .collect()
}

/// Index of the non-empty run holding `cp`. The document end maps to the
/// last non-empty run so text can be appended to it, or to the last run when
/// every run is empty.
pub fn run_index_for_char<T>(runs: &[PropertyNode<T>], cp: u32) -> Option<usize> {
    let mut last_non_empty = None;
    for (index, run) in runs.iter().enumerate() {
        if run.contains(cp) {
            return Some(index);
        }
        if !run.is_empty() {
            last_non_empty = Some((index, run.end()));
        }
    }
    last_non_empty
        .or_else(|| runs.last().map(|run| (runs.len() - 1, run.end())))
        .filter(|&(_, end)| end == cp)
        .map(|(index, _)| index)
}

/// Insert a zero-length run at `cp_start` before run `list_index` and return
/// the new run's index.
///
/// A run strictly containing `cp_start` is split around the new one; the
/// right half gets its own copy of the payload.
pub fn insert_run<T: Clone>(
    runs: &mut Vec<PropertyNode<T>>,
    list_index: usize,
    cp_start: u32,
    payload: T,
) -> Result<usize> {
    let inserted = PropertyNode::empty_at(cp_start, payload);

    if list_index == runs.len() {
        runs.push(inserted);
        return Ok(list_index);
    }
    let len = runs.len();
    let run = runs
        .get_mut(list_index)
        .ok_or_else(|| Error::index(list_index, len))?;

    if run.start() < cp_start {
        let mut right = PropertyNode::empty_at(cp_start, run.payload().clone());
        right.set_end(run.end().max(cp_start));
        run.set_end(cp_start);

        runs.insert(list_index + 1, inserted);
        runs.insert(list_index + 2, right);
        Ok(list_index + 1)
    } else {
        runs.insert(list_index, inserted);
        Ok(list_index)
    }
}

/// Extend run `list_index` by `length` and shift every later run.
pub fn adjust_runs_for_insert<T>(
    runs: &mut [PropertyNode<T>],
    list_index: usize,
    length: u32,
) -> Result<()> {
    let len = runs.len();
    let (target, rest) = runs
        .get_mut(list_index..)
        .and_then(|tail| tail.split_first_mut())
        .ok_or_else(|| Error::index(list_index, len))?;

    target.set_end(target.end() + length);
    for run in rest {
        run.shift_right(length);
    }
    Ok(())
}

/// Remove `[offset, offset + length)`, starting from run `list_index` (the
/// run holding `offset`).
///
/// Runs fully inside the deletion collapse to zero length at `offset`; they
/// stay in the list.
pub fn adjust_runs_for_delete<T>(
    runs: &mut [PropertyNode<T>],
    list_index: usize,
    offset: u32,
    length: u32,
) -> Result<()> {
    let end_mark = offset + length;

    let mut end_index = list_index;
    loop {
        let run = runs
            .get(end_index)
            .ok_or_else(|| Error::index(end_index, runs.len()))?;
        if run.end() >= end_mark {
            break;
        }
        end_index += 1;
    }

    if list_index == end_index {
        let run = &mut runs[end_index];
        run.set_end(run.end() - end_mark + offset);
    } else {
        runs[list_index].set_end(offset);
        for run in &mut runs[list_index + 1..end_index] {
            run.set_start(offset);
            run.set_end(offset);
        }
        let last = &mut runs[end_index];
        last.set_end(last.end() - end_mark + offset);
        last.set_start(last.start().min(offset));
    }

    for run in &mut runs[end_index + 1..] {
        run.shift_left(length);
    }
    Ok(())
}

/// Split every run crossing one of `breaks` (ascending character positions).
///
/// An FKP entry describes one ascending byte range, so a run must not span a
/// jump in file position. Each part keeps a copy of the payload.
pub fn split_runs_at<T: Clone>(runs: &mut Vec<PropertyNode<T>>, breaks: &[u32]) {
    if breaks.is_empty() {
        return;
    }
    let mut split = Vec::with_capacity(runs.len());
    for mut run in runs.drain(..) {
        for &cp in breaks {
            if cp <= run.start() {
                continue;
            }
            if cp >= run.end() {
                break;
            }
            let mut left = PropertyNode::empty_at(run.start(), run.payload().clone());
            left.set_end(cp);
            split.push(left);
            run.set_start(cp);
        }
        split.push(run);
    }
    trace!(runs = split.len(), breaks = breaks.len(), "split runs at file breaks");
    *runs = split;
}

/// Paginate `runs` into FKPs appended to `doc_stream` and return the bin
/// table plex.
///
/// The first page starts on the next 512-byte boundary. Each plex entry spans
/// from its first run's start to the next page's first run (or the last run's
/// end), offset by `fc_min`.
pub fn write_pages<T>(
    runs: &[PropertyNode<T>],
    doc_stream: &mut Vec<u8>,
    fc_min: u32,
    mut pack: impl FnMut(&[PropertyNode<T>]) -> Result<PackedPage>,
) -> Result<PlexOfCps> {
    let padding = (FKP_PAGE_SIZE - doc_stream.len() % FKP_PAGE_SIZE) % FKP_PAGE_SIZE;
    doc_stream.resize(doc_stream.len() + padding, 0);

    let final_end = runs.last().map_or(0, PropertyNode::end);
    let mut plex = PlexOfCps::new(4);
    let mut page_num = (doc_stream.len() / FKP_PAGE_SIZE) as u32;
    let mut rest = runs;

    while let Some(first) = rest.first() {
        let packed = pack(rest)?;
        doc_stream.extend_from_slice(&packed.bytes);

        let overflow = packed.overflow(rest);
        let end = overflow.first().map_or(final_end, PropertyNode::start);
        plex.add_property(GenericPropertyNode::new(
            first.start() + fc_min,
            end + fc_min,
            u32_struct(page_num),
        )?)?;

        page_num += 1;
        rest = overflow;
    }

    debug!(runs = runs.len(), pages = plex.len(), "wrote formatted disk pages");
    Ok(plex)
}

/// Check that non-empty runs tile `[0, total)` exactly.
pub fn check_runs_cover<T>(runs: &[PropertyNode<T>], total: u32) -> Result<()> {
    let mut expected = 0;
    for run in runs.iter().filter(|run| !run.is_empty()) {
        if run.start() != expected {
            return Err(Error::CorruptedFile(format!(
                "run [{}, {}) does not continue at {expected}",
                run.start(),
                run.end()
            )));
        }
        expected = run.end();
    }
    if expected != total {
        return Err(Error::CorruptedFile(format!(
            "runs end at {expected}, text ends at {total}"
        )));
    }
    Ok(())
}
