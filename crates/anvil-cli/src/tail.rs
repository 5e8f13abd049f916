//! Reading the end of a build log.

use anvil_core::Result;
use std::collections::VecDeque;
use std::path::Path;

/// Last `count` lines of the file at `path`. Invalid UTF-8 is replaced.
pub async fn last_lines(path: &Path, count: usize) -> Result<Vec<String>> {
    let content = tokio::fs::read(path).await?;
    let content = String::from_utf8_lossy(&content);

    let mut lines = VecDeque::with_capacity(count + 1);
    for line in content.lines() {
        lines.push_back(line.to_string());
        if lines.len() > count {
            lines.pop_front();
        }
    }
    Ok(lines.into())
}
