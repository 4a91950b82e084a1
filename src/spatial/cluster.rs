//! Row, column-band and table clustering.

use super::pairing::is_label_shaped;
use super::{Column, Row, Table, TableCell, TextBlock};
use crate::config::SpatialConfig;
use std::collections::BTreeSet;

/// Group blocks into rows by vertical center and reorder them into reading
/// order. Returns the reordered blocks and rows indexing into them.
///
/// A block joins the current row when its center is within `tolerance` of the
/// row's running mean center.
pub(crate) fn cluster_rows(mut blocks: Vec<TextBlock>, tolerance: f64) -> (Vec<TextBlock>, Vec<Row>) {
    blocks.sort_by(|a, b| a.cy().total_cmp(&b.cy()).then(a.bbox.x0.total_cmp(&b.bbox.x0)));

    let mut groups: Vec<Vec<TextBlock>> = Vec::new();
    let mut mean = 0.0;
    for block in blocks {
        match groups.last_mut() {
            Some(group) if (block.cy() - mean).abs() <= tolerance => {
                group.push(block);
                mean = group.iter().map(|b| b.cy()).sum::<f64>() / group.len() as f64;
            }
            _ => {
                mean = block.cy();
                groups.push(vec![block]);
            }
        }
    }

    let mut ordered = Vec::new();
    let mut rows = Vec::with_capacity(groups.len());
    for mut group in groups {
        group.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
        let y = group.iter().map(|b| b.cy()).sum::<f64>() / group.len() as f64;
        let start = ordered.len();
        ordered.extend(group);
        rows.push(Row {
            y,
            blocks: (start..ordered.len()).collect(),
        });
    }
    (ordered, rows)
}

/// Cluster block x-centers into bands; a band present in at least two rows is
/// a column. Returns the columns (ordered by x) and, per block, its column.
pub(crate) fn cluster_columns(
    blocks: &[TextBlock],
    rows: &[Row],
    tolerance: f64,
) -> (Vec<Column>, Vec<Option<usize>>) {
    let mut row_of = vec![0usize; blocks.len()];
    for (r, row) in rows.iter().enumerate() {
        for &i in &row.blocks {
            row_of[i] = r;
        }
    }

    let mut order: Vec<usize> = (0..blocks.len()).collect();
    order.sort_by(|&a, &b| blocks[a].cx().total_cmp(&blocks[b].cx()));

    let mut bands: Vec<Vec<usize>> = Vec::new();
    let mut mean = 0.0;
    for i in order {
        let cx = blocks[i].cx();
        match bands.last_mut() {
            Some(band) if (cx - mean).abs() <= tolerance => {
                band.push(i);
                mean = band.iter().map(|&j| blocks[j].cx()).sum::<f64>() / band.len() as f64;
            }
            _ => {
                mean = cx;
                bands.push(vec![i]);
            }
        }
    }

    let mut columns = Vec::new();
    let mut block_column = vec![None; blocks.len()];
    for band in bands {
        let band_rows: BTreeSet<usize> = band.iter().map(|&i| row_of[i]).collect();
        if band_rows.len() < 2 {
            continue;
        }
        let centers = band.iter().map(|&i| blocks[i].cx());
        let (lo, hi) = centers.fold((f64::MAX, f64::MIN), |(lo, hi), x| (lo.min(x), hi.max(x)));
        let id = columns.len();
        for &i in &band {
            block_column[i] = Some(id);
        }
        columns.push(Column {
            x: band.iter().map(|&i| blocks[i].cx()).sum::<f64>() / band.len() as f64,
            x_min: lo - tolerance,
            x_max: hi + tolerance,
            blocks: band,
            rows: band_rows.into_iter().collect(),
        });
    }
    (columns, block_column)
}

/// Find runs of consecutive rows sharing at least `min_table_columns` bands.
pub(crate) fn detect_tables(
    blocks: &[TextBlock],
    rows: &[Row],
    columns: &[Column],
    block_column: &[Option<usize>],
    config: &SpatialConfig,
) -> Vec<Table> {
    let signatures: Vec<BTreeSet<usize>> = rows
        .iter()
        .map(|r| r.blocks.iter().filter_map(|&i| block_column[i]).collect())
        .collect();

    let mut tables = Vec::new();
    let mut start = 0;
    while start < rows.len() {
        if signatures[start].len() < config.min_table_columns {
            start += 1;
            continue;
        }
        let mut shared = signatures[start].clone();
        let mut end = start + 1;
        while end < rows.len() {
            let next: BTreeSet<usize> = shared.intersection(&signatures[end]).copied().collect();
            if next.len() < config.min_table_columns {
                break;
            }
            shared = next;
            end += 1;
        }
        if end - start >= config.min_table_rows {
            tables.push(build_table(blocks, rows, columns, block_column, start..end, shared));
            start = end;
        } else {
            start += 1;
        }
    }
    tables
}

fn build_table(
    blocks: &[TextBlock],
    rows: &[Row],
    columns: &[Column],
    block_column: &[Option<usize>],
    span: std::ops::Range<usize>,
    shared: BTreeSet<usize>,
) -> Table {
    let mut table_columns: Vec<usize> = shared.into_iter().collect();
    table_columns.sort_by(|&a, &b| columns[a].x.total_cmp(&columns[b].x));

    let mut cells: Vec<TableCell> = Vec::new();
    for (r, row_idx) in span.clone().enumerate() {
        for &i in &rows[row_idx].blocks {
            let Some(col) = block_column[i] else { continue };
            let Some(c) = table_columns.iter().position(|&tc| tc == col) else {
                continue;
            };
            match cells.iter_mut().find(|cell| cell.row == r && cell.column == c) {
                Some(cell) => cell.blocks.push(i),
                None => cells.push(TableCell {
                    row: r,
                    column: c,
                    blocks: vec![i],
                }),
            }
        }
    }

    let has_header = rows[span.start]
        .blocks
        .iter()
        .all(|&i| is_label_shaped(blocks[i].content()));

    Table {
        rows: span.collect(),
        columns: table_columns,
        cells,
        has_header,
    }
}
