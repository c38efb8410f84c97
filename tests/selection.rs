use slabcopy::selection::{DatasetShape, Region, Selection, chunk_shape};

fn shapes() -> Vec<Vec<u64>> {
    let extents = [0u64, 1, 2, 3, 7, 2048];
    let mut out = Vec::new();
    for &a in &extents {
        out.push(vec![a]);
        for &b in &extents {
            out.push(vec![a, b]);
            for &c in &extents {
                out.push(vec![a, b, c]);
            }
        }
    }
    out.push(vec![4, 3, 2, 5]);
    out
}

#[test]
fn preview_reads_two_full_rows() {
    for extents in shapes().into_iter().filter(|s| s.len() >= 2) {
        let rank = extents.len();
        if extents[rank - 2] < 2 {
            continue;
        }
        let shape = DatasetShape::new(extents.clone());
        let sel = Selection::preview(&shape, 2, 10);
        assert_eq!(sel.count()[rank - 2], 2, "shape {extents:?}");
        assert_eq!(sel.count()[rank - 1], extents[rank - 1], "shape {extents:?}");
    }
}

#[test]
fn preview_clamps_to_single_row() {
    let shape = DatasetShape::new(vec![5, 1, 2048]);
    let sel = Selection::preview(&shape, 2, 10);
    assert_eq!(sel.count(), &[1, 1, 2048]);
    assert_eq!(sel.offset(), &[0, 0, 0]);
    assert_eq!(sel.num_elements(), Some(2048));
}

#[test]
fn preview_of_one_dimension() {
    let sel = Selection::preview(&DatasetShape::new(vec![5000]), 2, 10);
    assert_eq!(sel.count(), &[10]);
    let sel = Selection::preview(&DatasetShape::new(vec![4]), 2, 10);
    assert_eq!(sel.count(), &[4]);
}

#[test]
fn leading_axes_pinned() {
    let shape = DatasetShape::new(vec![16, 512, 2048]);
    let sel = Selection::for_region(&shape, Region::default());
    assert_eq!(sel.count(), &[1, 2, 2048]);
    assert_eq!(sel.row_length(), 2048);
}

#[test]
fn never_over_reads() {
    for extents in shapes() {
        let shape = DatasetShape::new(extents.clone());
        for region in [Region::default(), Region::Whole] {
            let sel = Selection::for_region(&shape, region);
            assert!(sel.fits(&shape), "{region:?} over-reads {extents:?}");
            let product: u64 = sel.count().iter().product();
            assert_eq!(sel.num_elements(), Some(product));
        }
    }
}

#[test]
fn whole_is_identity() {
    let shape = DatasetShape::new(vec![3, 4, 5]);
    let sel = Selection::whole(&shape);
    assert_eq!(sel.count(), shape.extents());
    assert_eq!(sel.num_elements(), shape.num_elements());
}

#[test]
fn scalar_selection() {
    let sel = Selection::preview(&DatasetShape::new(Vec::<u64>::new()), 2, 10);
    assert_eq!(sel.rank(), 0);
    assert_eq!(sel.num_elements(), Some(1));
}

#[test]
fn overflowing_count() {
    let shape = DatasetShape::new(vec![u64::MAX, u64::MAX]);
    assert_eq!(Selection::whole(&shape).num_elements(), None);
}

#[test]
fn chunk_shape_is_clamped() {
    assert_eq!(chunk_shape(&[5000], 100), vec![100]);
    assert_eq!(chunk_shape(&[30, 2048, 0], 100), vec![30, 100, 1]);
}

#[test]
fn shape_display() {
    assert_eq!(DatasetShape::new(vec![2, 2048]).to_string(), "[ 2 2048 ]");
}
