//! Whitespace suppression for lines that only carry directives, comments or
//! statement blocks.

use tracing::debug;

use crate::program::Operation;

/// Remove the literal whitespace of every line group that has no output of its
/// own. Returns the number of suppressed lines.
///
/// A group runs up to and including the next literal ending in `\n`. It is
/// suppressed when it contains at least one non-literal operation, no
/// expression, and only whitespace literals. A line made of literal text alone
/// is always kept, so blank source lines survive.
pub fn suppress_blank_lines(operations: &mut Vec<Operation>) -> usize {
    let mut keep = vec![true; operations.len()];
    let mut suppressed = 0;
    let mut group_start = 0;

    for index in 0..operations.len() {
        let closes_line =
            matches!(&operations[index], Operation::Literal(text) if text.ends_with('\n'));
        let last = index + 1 == operations.len();
        if !closes_line && !last {
            continue;
        }

        let group = group_start..index + 1;
        if is_suppressible(&operations[group.clone()]) {
            for position in group {
                if matches!(operations[position], Operation::Literal(_)) {
                    keep[position] = false;
                }
            }
            suppressed += 1;
        }
        group_start = index + 1;
    }

    let mut flags = keep.into_iter();
    operations.retain(|_| flags.next().unwrap_or(true));
    debug!(suppressed_lines = suppressed, "optimized whitespace");
    suppressed
}

fn is_suppressible(group: &[Operation]) -> bool {
    let mut has_marker = false;
    for operation in group {
        match operation {
            Operation::Expression(_) => return false,
            Operation::Literal(text) if !text.trim().is_empty() => return false,
            Operation::Literal(_) => {}
            Operation::Block(_) | Operation::Comment(_) | Operation::Directive { .. } => {
                has_marker = true;
            }
        }
    }
    has_marker
}
