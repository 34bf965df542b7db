/// Largest `n` whose Fibonacci number fits in a `u64`.
pub const MAX_FIB_INPUT: u32 = 93;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FibError {
    #[error("fib({0}) overflows u64 (max input {MAX_FIB_INPUT})")]
    Overflow(u32),
}

/// Iterative Fibonacci with `fib(0) = 0` and `fib(1) = 1`.
///
/// # Errors
///
/// Returns [`FibError::Overflow`] for inputs above [`MAX_FIB_INPUT`].
pub fn fib(n: u32) -> Result<u64, FibError> {
    if n == 0 {
        return Ok(0);
    }
    let (mut prev, mut current) = (0_u64, 1_u64);
    for _ in 1..n {
        let next = prev.checked_add(current).ok_or(FibError::Overflow(n))?;
        (prev, current) = (current, next);
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values() {
        let values: Vec<_> = (0..10).map(|n| fib(n).unwrap()).collect();
        assert_eq!(values, vec![0, 1, 1, 2, 3, 5, 8, 13, 21, 34]);
    }

    #[test]
    fn largest_input_fits() {
        assert_eq!(fib(MAX_FIB_INPUT), Ok(12_200_160_415_121_876_738));
    }

    #[test]
    fn overflow_is_an_error() {
        assert_eq!(fib(MAX_FIB_INPUT + 1), Err(FibError::Overflow(94)));
    }
}
