use chrono::Local;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// Appends a timestamped message to a file under logs/.
///
/// # Arguments
///
/// * `filename` - The name of the log file (created under logs/)
/// * `message` - The message to log
///
/// # Returns
///
/// * `io::Result<()>` - Success or error result
pub fn log_to_file(filename: &str, message: &str) -> io::Result<()> {
    let path = log_path(filename)?;

    // Open file in append mode, create if it doesn't exist
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    writeln!(file, "[{}] {}", timestamp, message)?;
    file.flush()?;

    Ok(())
}

/// Appends a row to a CSV file under logs/, writing headers if the file is new.
///
/// # Arguments
///
/// * `filename` - The name of the CSV file
/// * `headers` - Column headers (only written if file is new)
/// * `data` - Row of data to append
///
/// # Returns
///
/// * `io::Result<()>` - Success or error result
pub fn log_csv(filename: &str, headers: &[&str], data: &[&str]) -> io::Result<()> {
    let path = log_path(filename)?;
    let file_exists = Path::new(&path).exists();

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    if !file_exists && !headers.is_empty() {
        writeln!(file, "{}", headers.join(","))?;
    }

    writeln!(file, "{}", data.join(","))?;
    file.flush()?;

    Ok(())
}

fn log_path(filename: &str) -> io::Result<String> {
    let log_dir = "logs";
    if !Path::new(log_dir).exists() {
        std::fs::create_dir_all(log_dir)?;
    }
    Ok(format!("{}/{}", log_dir, filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn log_to_file_appends_timestamped_lines() {
        let name = "log_test_messages.log";
        let path = format!("logs/{}", name);
        let _ = fs::remove_file(&path);

        log_to_file(name, "first").unwrap();
        log_to_file(name, "second").unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let _ = fs::remove_file(&path);
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.starts_with('[')));
        assert!(lines[0].ends_with("first"));
        assert!(lines[1].ends_with("second"));
    }

    #[test]
    fn log_csv_writes_headers_only_for_a_new_file() {
        let name = "log_test_rows.csv";
        let path = format!("logs/{}", name);
        let _ = fs::remove_file(&path);

        log_csv(name, &["a", "b"], &["1", "2"]).unwrap();
        log_csv(name, &["a", "b"], &["3", "4"]).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let _ = fs::remove_file(&path);
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["a,b", "1,2", "3,4"]);
    }
}
