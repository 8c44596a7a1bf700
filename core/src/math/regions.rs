/// Half-open `[start, end)` index runs where `condition` is true.
pub fn contiguous_regions(condition: &[bool]) -> Vec<[usize; 2]> {
    let mut regions = Vec::new();
    let mut start = None;
    for (idx, &flag) in condition.iter().enumerate() {
        match (flag, start) {
            (true, None) => start = Some(idx),
            (false, Some(begin)) => {
                regions.push([begin, idx]);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(begin) = start {
        regions.push([begin, condition.len()]);
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_of_mixed_mask() {
        let mask = [false, true, true, false, true, false, false, true];
        assert_eq!(contiguous_regions(&mask), vec![[1, 3], [4, 5], [7, 8]]);
    }

    #[test]
    fn regions_touching_both_edges() {
        assert_eq!(contiguous_regions(&[true, false, true]), vec![[0, 1], [2, 3]]);
        assert_eq!(contiguous_regions(&[true; 4]), vec![[0, 4]]);
    }

    #[test]
    fn no_regions_when_all_false() {
        assert!(contiguous_regions(&[false; 5]).is_empty());
        assert!(contiguous_regions(&[]).is_empty());
    }
}
