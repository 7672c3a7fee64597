pub mod progress_utils;
#[cfg(test)]
pub mod test_utils;
