/// Smallest `r` with `r * r >= n`.
pub(crate) fn ceil_sqrt(n: u32) -> u32 {
    let r = n.isqrt();
    if r * r == n { r } else { r + 1 }
}

#[cfg_attr(not(feature = "gpu"), allow(dead_code))]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
