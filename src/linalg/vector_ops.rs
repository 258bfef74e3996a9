use faer::{Col, ColRef, unzip, zip};

use crate::E;

/// Componentwise `max(x, 0)`.
pub(crate) fn positive_part<'a>(x: ColRef<'a, E>) -> Col<E> {
    let mut out = Col::<E>::zeros(x.nrows());

    zip!(x, out.as_mut()).for_each(|unzip!(x, out)| *out = x.max(0.));

    out
}

/// Componentwise `min(x, 0)`.
pub(crate) fn negative_part<'a>(x: ColRef<'a, E>) -> Col<E> {
    let mut out = Col::<E>::zeros(x.nrows());

    zip!(x, out.as_mut()).for_each(|unzip!(x, out)| *out = x.min(0.));

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_part() {
        let x_data = [1.0, -2.0, 0.0, 3.0];
        let x = Col::from_fn(x_data.len(), |i| x_data[i]);
        let result = positive_part(x.as_ref());
        let expected = [1.0, 0.0, 0.0, 3.0];
        let expected_col = Col::from_fn(expected.len(), |i| expected[i]);
        assert_eq!(result, expected_col);
    }

    #[test]
    fn test_negative_part() {
        let x_data = [1.0, -2.0, 0.0, 3.0];
        let x = Col::from_fn(x_data.len(), |i| x_data[i]);
        let result = negative_part(x.as_ref());
        let expected = [0.0, -2.0, 0.0, 0.0];
        let expected_col = Col::from_fn(expected.len(), |i| expected[i]);
        assert_eq!(result, expected_col);
    }
}
