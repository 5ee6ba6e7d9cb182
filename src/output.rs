use std::cmp::max;
use std::io::{stdout, Write};
use std::time::Duration;

use crate::progress_message::Progress;
use crossbeam_channel::Receiver;

const KB: f64 = 1024.0;
const MB: f64 = KB * 1024.0;
const GB: f64 = MB * 1024.0;

// Display thread. Runs until every sender is dropped.
pub fn run_output(recv: Receiver<Progress>) {
    render(recv, &mut stdout());
}

fn render<W: Write>(recv: Receiver<Progress>, out: &mut W) {
    use Progress::*;
    // a progress line without its newline yet
    let mut mid_line = false;
    let mut remote = String::new();
    let mut total_bytes = 0;
    let mut bytes_so_far = 0;
    let mut prev_bytes_pct = 0.0;
    while let Ok(progress) = recv.recv() {
        match progress {
            Start(path, size) => {
                remote = path;
                total_bytes = size;
                bytes_so_far = 0;
                prev_bytes_pct = 0.0;
            }
            Part(bytes) => {
                if total_bytes == 0 {
                    continue;
                }
                bytes_so_far += bytes as u64;
                let bytes_pct = (bytes_so_far as f64) / (total_bytes as f64) * 100.0;
                if (prev_bytes_pct - bytes_pct).abs() < 1.0 {
                    // only update display if > 1% progress
                    continue;
                }
                prev_bytes_pct = bytes_pct;
                let msg = format!(
                    "\rUploading {remote}: {:.0}% of {}",
                    bytes_pct,
                    humanize(total_bytes)
                );
                write_out(out, msg.as_bytes());
                mid_line = true;
            }
            Finished(elapsed) => {
                let msg = format!(
                    "\rUploaded {} at {}.\x1B[K\n",
                    humanize(total_bytes),
                    humanize_speed(total_bytes, elapsed),
                );
                write_out(out, msg.as_bytes());
                mid_line = false;
            }
        }
    }
    // upload failed part way, don't leave the next log line glued to it
    if mid_line {
        write_out(out, b"\n");
    }
}

// A closed stdout is not worth aborting an upload for.
fn write_out<W: Write>(out: &mut W, msg: &[u8]) {
    let _ = out.write_all(msg);
    let _ = out.flush();
}

fn humanize(size: u64) -> String {
    let fsize = size as f64;
    if fsize > GB {
        format!("{:.1} GiB", fsize / GB)
    } else if fsize > MB {
        format!("{} MiB", (fsize / MB).round())
    } else if fsize > KB {
        format!("{} KiB", (fsize / KB).round())
    } else {
        format!("{size} bytes")
    }
}

fn humanize_speed(size: u64, time: Duration) -> String {
    let t = max(time.as_secs(), 1) as f64;
    let fsize = size as f64;
    if fsize > MB {
        format!("{:.2} MiB/s", (fsize / MB) / t)
    } else if fsize > KB {
        format!("{:.0} KiB/s", (fsize / KB) / t)
    } else {
        format!("{} B/s", fsize / t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanize() {
        assert_eq!(humanize(512), "512 bytes");
        assert_eq!(humanize(4 * 1024), "4 KiB");
        assert_eq!(humanize(20 * 1024 * 1024), "20 MiB");
        assert_eq!(humanize(3 * 1024 * 1024 * 1024 / 2), "1.5 GiB");
    }

    #[test]
    fn test_humanize_speed() {
        let ten_mib = 10 * 1024 * 1024;
        assert_eq!(humanize_speed(ten_mib, Duration::from_secs(4)), "2.50 MiB/s");
        // sub-second uploads count as one second
        assert_eq!(humanize_speed(100, Duration::from_millis(10)), "100 B/s");
    }

    #[test]
    fn test_run_output_ends_when_senders_dropped() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(Progress::Start("/vmfs/volumes/ds/x".to_string(), 10))
            .unwrap();
        tx.send(Progress::Part(10)).unwrap();
        tx.send(Progress::Finished(Duration::from_secs(1))).unwrap();
        drop(tx);
        run_output(rx);
    }

    #[test]
    fn test_completed_upload_ends_its_line() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(Progress::Start("/vmfs/volumes/ds/x".to_string(), 2048))
            .unwrap();
        tx.send(Progress::Part(1024)).unwrap();
        tx.send(Progress::Part(1024)).unwrap();
        tx.send(Progress::Finished(Duration::from_secs(1))).unwrap();
        drop(tx);

        let mut out = Vec::new();
        render(rx, &mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\rUploading /vmfs/volumes/ds/x: 50% of 2 KiB"));
        assert!(text.ends_with("\rUploaded 2 KiB at 2 KiB/s.\x1B[K\n"));
    }

    #[test]
    fn test_failed_upload_ends_its_line() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(Progress::Start("/vmfs/volumes/ds/x".to_string(), 4096))
            .unwrap();
        tx.send(Progress::Part(1024)).unwrap();
        // session gone without a Finished
        drop(tx);

        let mut out = Vec::new();
        render(rx, &mut out);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\rUploading /vmfs/volumes/ds/x: 25% of 4 KiB\n"
        );
    }

    #[test]
    fn test_nothing_uploaded_writes_nothing() {
        let (tx, rx) = crossbeam_channel::unbounded::<Progress>();
        drop(tx);
        let mut out = Vec::new();
        render(rx, &mut out);
        assert!(out.is_empty());
    }
}
