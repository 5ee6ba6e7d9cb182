use std::time::Duration;

pub enum Progress {
    // upload started. values are remote path and total bytes.
    Start(String, u64),
    // uploaded a block. value is bytes in this block.
    Part(usize),
    // whole file is on the remote. value is how long the upload took.
    Finished(Duration),
}
