//! Axis labels for exported and rendered tables.
//!
//! Columns are labelled with engine speed and rows with load, both as linear
//! ramps from zero. The step is computed first with integer division, so an
//! 8-row table steps load by 12 rather than 12.5.

/// Engine speed spanned by the column axis.
pub const RPM_SPAN: u32 = 8000;
/// Load percentage spanned by the row axis.
pub const LOAD_SPAN: u32 = 100;

pub fn rpm_step(cols: usize) -> u32 {
    if cols == 0 {
        return 0;
    }
    RPM_SPAN / cols as u32
}

pub fn load_step(rows: usize) -> u32 {
    if rows == 0 {
        return 0;
    }
    LOAD_SPAN / rows as u32
}

/// RPM label of every column.
pub fn rpm_axis(cols: usize) -> Vec<u32> {
    let step = rpm_step(cols);
    (0..cols as u32).map(|c| c * step).collect()
}

/// Load label (percent) of every row.
pub fn load_axis(rows: usize) -> Vec<u32> {
    let step = load_step(rows);
    (0..rows as u32).map(|r| r * step).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpm_axis() {
        let axis = rpm_axis(16);
        assert_eq!(axis.len(), 16);
        assert_eq!(axis[0], 0);
        assert_eq!(axis[1], 500);
        assert_eq!(axis[15], 7500);
        assert_eq!(rpm_axis(8)[7], 7000);
    }

    #[test]
    fn test_load_axis_integer_step() {
        assert_eq!(load_axis(8), vec![0, 12, 24, 36, 48, 60, 72, 84]);
        assert_eq!(load_axis(16)[15], 90);
        assert!(load_axis(0).is_empty());
    }
}
