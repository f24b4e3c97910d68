use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;

use crate::calc;
use crate::record::Student;

/// Rejections the store reports to its caller. I/O problems surface
/// separately as `anyhow` errors from `open`/`reload`/`save`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("a record with code {0} already exists")]
    DuplicateCode(i64),
    #[error("no record with code {0}")]
    NotFound(i64),
}

/// The in-memory roster plus its file-backed persistence.
///
/// `students` is the display order (file order, then whatever the last sort
/// produced); `by_code` maps each code to its position and is rebuilt
/// whenever positions move. The two are always in sync: every record has
/// exactly one index entry and vice versa.
///
/// One store owns one file. Two stores pointed at the same path do not see
/// each other's writes; the last one to save wins.
pub struct RosterStore {
    path: PathBuf,
    students: Vec<Student>,
    by_code: HashMap<i64, usize>,
}

impl RosterStore {
    /// Open the roster at `path`, creating it empty if it does not exist,
    /// and load every parseable line.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<RosterStore> {
        let mut store = RosterStore {
            path: path.into(),
            students: Vec::new(),
            by_code: HashMap::new(),
        };
        store.reload()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the roster file, replacing whatever is in memory.
    ///
    /// Parsing is best-effort: blank lines are dropped, a purely numeric
    /// first line is taken as the save-time record count and skipped
    /// without being checked against the rows that follow, and any line
    /// that is not exactly six fields with numeric marks is skipped. A line
    /// re-using an already-seen code is skipped too (keep-first), so the
    /// sequence and the index cannot diverge.
    pub fn reload(&mut self) -> anyhow::Result<()> {
        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create directory {}", parent.to_string_lossy())
                    })?;
                }
            }
            std::fs::write(&self.path, "").with_context(|| {
                format!("failed to create roster {}", self.path.to_string_lossy())
            })?;
        }

        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("failed to read roster {}", self.path.to_string_lossy()))?;
        let text = String::from_utf8_lossy(&bytes);

        let mut students: Vec<Student> = Vec::new();
        let mut by_code: HashMap<i64, usize> = HashMap::new();
        let mut first_line = true;
        for raw in text.lines() {
            let t = raw.trim();
            if t.is_empty() {
                continue;
            }
            if first_line {
                first_line = false;
                if t.chars().all(|c| c.is_ascii_digit()) {
                    continue;
                }
            }
            let Some(s) = Student::parse_line(t) else {
                continue;
            };
            if by_code.contains_key(&s.code) {
                continue;
            }
            by_code.insert(s.code, students.len());
            students.push(s);
        }

        self.students = students;
        self.by_code = by_code;
        Ok(())
    }

    /// Write the roster back to its file: a record-count line, then one
    /// line per record in current display order. The write goes to a
    /// sibling temp file and is renamed over the target, so a crash
    /// mid-write never leaves a truncated roster. On failure the in-memory
    /// state is untouched and the save can be retried.
    pub fn save(&self) -> anyhow::Result<()> {
        let mut out = String::new();
        out.push_str(&self.students.len().to_string());
        out.push('\n');
        for s in &self.students {
            out.push_str(&s.to_line());
            out.push('\n');
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".saving");
        let tmp = PathBuf::from(tmp_name);
        std::fs::write(&tmp, out)
            .with_context(|| format!("failed to write {}", tmp.to_string_lossy()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace roster {}", self.path.to_string_lossy()))?;
        Ok(())
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn get(&self, code: i64) -> Option<&Student> {
        self.by_code.get(&code).map(|&i| &self.students[i])
    }

    /// Append a record. The only check is code uniqueness; marks are taken
    /// as-is. Nothing touches the file until `save`.
    pub fn add(&mut self, student: Student) -> Result<(), StoreError> {
        if self.by_code.contains_key(&student.code) {
            return Err(StoreError::DuplicateCode(student.code));
        }
        self.by_code.insert(student.code, self.students.len());
        self.students.push(student);
        Ok(())
    }

    /// Remove the record with `code`, returning it.
    pub fn delete(&mut self, code: i64) -> Result<Student, StoreError> {
        let Some(&pos) = self.by_code.get(&code) else {
            return Err(StoreError::NotFound(code));
        };
        let removed = self.students.remove(pos);
        self.reindex();
        Ok(removed)
    }

    /// Record with the highest total. Ties keep the earliest record in
    /// display order. None when the roster is empty.
    pub fn highest(&self) -> Option<&Student> {
        let mut best: Option<&Student> = None;
        for s in &self.students {
            let better = match best {
                Some(b) => s.total() > b.total(),
                None => true,
            };
            if better {
                best = Some(s);
            }
        }
        best
    }

    /// Record with the lowest total; same tie-break as `highest`.
    pub fn lowest(&self) -> Option<&Student> {
        let mut best: Option<&Student> = None;
        for s in &self.students {
            let better = match best {
                Some(b) => s.total() < b.total(),
                None => true,
            };
            if better {
                best = Some(s);
            }
        }
        best
    }

    /// Reorder the roster by total. The sort is stable, so equal totals
    /// keep their relative order in either direction. Direction is the
    /// caller's choice every time; the store keeps no toggle.
    pub fn sort_by_total(&mut self, ascending: bool) {
        if ascending {
            self.students.sort_by_key(|s| s.total());
        } else {
            self.students.sort_by_key(|s| std::cmp::Reverse(s.total()));
        }
        self.reindex();
    }

    /// Mean percentage across the roster, rounded to 2 decimals. None when
    /// the roster is empty.
    pub fn average_percentage(&self) -> Option<f64> {
        calc::average_percentage(self.students.iter().map(|s| s.percentage()))
    }

    fn reindex(&mut self) {
        self.by_code.clear();
        for (i, s) in self.students.iter().enumerate() {
            self.by_code.insert(s.code, i);
        }
    }
}
