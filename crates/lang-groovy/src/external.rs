//! Declarations read from compiled classes inside JAR archives.

use crate::error::Result;
use groovyscope_api::{Location, SymbolKind, SymbolOrigin, SymbolRecord};
use ristretto_classfile::{ClassAccessFlags, ClassFile, FieldAccessFlags, MethodAccessFlags};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

/// Bounds applied while reading an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveLimits {
    pub max_entries: usize,
    pub max_entry_size: u64,
    pub max_total_size: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
            max_entry_size: 50 * 1024 * 1024,
            max_total_size: 500 * 1024 * 1024,
        }
    }
}

/// `com/acme/Foo$Bar.class` -> `com.acme.Foo$Bar`, or `None` for entries that
/// never carry declarations.
fn class_name_of(entry_name: &str) -> Option<String> {
    let path = entry_name.strip_suffix(".class")?;
    if path.starts_with("META-INF/") {
        return None;
    }
    let simple = path.rsplit('/').next().unwrap_or(path);
    if simple == "module-info" || simple == "package-info" {
        return None;
    }
    // Anonymous and local classes: Foo$1, Foo$1Local
    if simple
        .split('$')
        .skip(1)
        .any(|part| part.is_empty() || part.starts_with(|c: char| c.is_ascii_digit()))
    {
        return None;
    }
    Some(path.replace('/', "."))
}

fn class_kind(flags: ClassAccessFlags) -> SymbolKind {
    if flags.contains(ClassAccessFlags::ANNOTATION) {
        SymbolKind::Annotation
    } else if flags.contains(ClassAccessFlags::INTERFACE) {
        SymbolKind::Interface
    } else if flags.contains(ClassAccessFlags::ENUM) {
        SymbolKind::Enum
    } else {
        SymbolKind::Class
    }
}

fn read_class(class_name: &str, bytes: Vec<u8>, archive: &Path) -> Vec<SymbolRecord> {
    let class = match ClassFile::from_bytes(&mut Cursor::new(bytes)) {
        Ok(class) => class,
        Err(e) => {
            debug!("Skipping unreadable class {} in {}: {e:?}", class_name, archive.display());
            return Vec::new();
        }
    };

    if !class.access_flags.contains(ClassAccessFlags::PUBLIC)
        || class.access_flags.contains(ClassAccessFlags::SYNTHETIC)
    {
        return Vec::new();
    }

    let record = |name: String, kind: SymbolKind| {
        SymbolRecord::new(
            name,
            kind,
            Location::new(archive.to_path_buf(), 1, 1),
            SymbolOrigin::Archive,
        )
    };

    let kind = class_kind(class.access_flags);
    let mut records = vec![record(class_name.to_string(), kind)];
    let mut seen = HashSet::new();

    for field in &class.fields {
        if field.access_flags.contains(FieldAccessFlags::SYNTHETIC) {
            continue;
        }
        let Ok(name) = class
            .constant_pool
            .try_get_utf8(field.name_index)
            .map(|n| n.to_string())
        else {
            continue;
        };
        let member_kind = if kind == SymbolKind::Enum
            && field.access_flags.contains(FieldAccessFlags::ENUM)
        {
            SymbolKind::EnumConstant
        } else {
            SymbolKind::Field
        };
        if seen.insert((name.clone(), member_kind)) {
            records.push(record(format!("{class_name}.{name}"), member_kind));
        }
    }

    for method in &class.methods {
        if method.access_flags.contains(MethodAccessFlags::SYNTHETIC)
            || method.access_flags.contains(MethodAccessFlags::BRIDGE)
        {
            continue;
        }
        let Ok(name) = class
            .constant_pool
            .try_get_utf8(method.name_index)
            .map(|n| n.to_string())
        else {
            continue;
        };
        let member_kind = match name.as_str() {
            "<clinit>" => continue,
            "<init>" => SymbolKind::Constructor,
            _ => SymbolKind::Method,
        };
        // Overloads collapse into one record per name.
        if seen.insert((name.clone(), member_kind)) {
            records.push(record(format!("{class_name}.{name}"), member_kind));
        }
    }

    records
}

/// Reads every class in the archive at `path` and returns its declarations.
///
/// Entries past `max_entries`, entries larger than `max_entry_size` and
/// anything after `max_total_size` uncompressed bytes are not read.
pub fn extract_archive(path: &Path, limits: &ArchiveLimits) -> Result<Vec<SymbolRecord>> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    let total_entries = archive.len();
    if total_entries > limits.max_entries {
        warn!(
            "Archive {} has {} entries, reading only the first {}",
            path.display(),
            total_entries,
            limits.max_entries
        );
    }

    let mut records = Vec::new();
    let mut bytes_read: u64 = 0;

    for i in 0..total_entries.min(limits.max_entries) {
        let mut entry = archive.by_index(i)?;
        if !entry.is_file() {
            continue;
        }
        let Some(class_name) = class_name_of(entry.name()) else {
            continue;
        };

        let size = entry.size();
        if size > limits.max_entry_size {
            warn!(
                "Skipping oversized entry {} ({} bytes) in {}",
                entry.name(),
                size,
                path.display()
            );
            continue;
        }
        if bytes_read.saturating_add(size) > limits.max_total_size {
            warn!(
                "Archive {} exceeds {} uncompressed bytes, stopping early",
                path.display(),
                limits.max_total_size
            );
            break;
        }

        let mut bytes = Vec::with_capacity(size as usize);
        (&mut entry)
            .take(limits.max_entry_size + 1)
            .read_to_end(&mut bytes)?;
        bytes_read += bytes.len() as u64;

        records.extend(read_class(&class_name, bytes, path));
    }

    debug!(
        "Read {} symbols from {} ({} bytes)",
        records.len(),
        path.display(),
        bytes_read
    );
    Ok(records)
}

/// Reads every class file below `dir`, a compiler output directory such as
/// `build/classes/groovy/main`, under the same limits as an archive.
pub fn extract_class_dir(dir: &Path, limits: &ArchiveLimits) -> Result<Vec<SymbolRecord>> {
    if !dir.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", dir.display()),
        )
        .into());
    }

    let mut records = Vec::new();
    let mut bytes_read: u64 = 0;
    let mut classes = 0usize;

    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file());
    for entry in walker {
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let entry_name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let Some(class_name) = class_name_of(&entry_name) else {
            continue;
        };

        if classes == limits.max_entries {
            warn!(
                "Class directory {} has more than {} classes, reading only the first {}",
                dir.display(),
                limits.max_entries,
                limits.max_entries
            );
            break;
        }
        classes += 1;

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if size > limits.max_entry_size {
            warn!("Skipping oversized class {} ({} bytes)", entry.path().display(), size);
            continue;
        }
        if bytes_read.saturating_add(size) > limits.max_total_size {
            warn!(
                "Class directory {} exceeds {} bytes, stopping early",
                dir.display(),
                limits.max_total_size
            );
            break;
        }

        let bytes = std::fs::read(entry.path())?;
        bytes_read += bytes.len() as u64;
        records.extend(read_class(&class_name, bytes, dir));
    }

    debug!(
        "Read {} symbols from class directory {} ({} bytes)",
        records.len(),
        dir.display(),
        bytes_read
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn utf8(out: &mut Vec<u8>, s: &str) {
        out.push(1);
        out.extend_from_slice(&(s.len() as u16).to_be_bytes());
        out.extend_from_slice(s.as_bytes());
    }

    /// A minimal abstract class with one `int` field and one abstract method.
    fn class_bytes(internal_name: &str, field: &str, method: &str) -> Vec<u8> {
        let mut b = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
        b.extend_from_slice(&9u16.to_be_bytes());
        utf8(&mut b, internal_name); // 1
        b.extend_from_slice(&[7, 0, 1]); // 2: Class #1
        utf8(&mut b, "java/lang/Object"); // 3
        b.extend_from_slice(&[7, 0, 3]); // 4: Class #3
        utf8(&mut b, field); // 5
        utf8(&mut b, "I"); // 6
        utf8(&mut b, method); // 7
        utf8(&mut b, "()V"); // 8
        b.extend_from_slice(&0x0421u16.to_be_bytes()); // public abstract super
        b.extend_from_slice(&[0, 2, 0, 4, 0, 0]);
        b.extend_from_slice(&[0, 1, 0x00, 0x01, 0, 5, 0, 6, 0, 0]);
        b.extend_from_slice(&[0, 1, 0x04, 0x01, 0, 7, 0, 8, 0, 0]);
        b.extend_from_slice(&[0, 0]);
        b
    }

    fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, bytes) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_class_names_from_entries() {
        assert_eq!(class_name_of("com/acme/Foo.class").as_deref(), Some("com.acme.Foo"));
        assert_eq!(
            class_name_of("com/acme/Foo$Bar.class").as_deref(),
            Some("com.acme.Foo$Bar")
        );
        assert_eq!(class_name_of("com/acme/Foo$1.class"), None);
        assert_eq!(class_name_of("com/acme/Foo$1Local.class"), None);
        assert_eq!(class_name_of("module-info.class"), None);
        assert_eq!(class_name_of("com/acme/package-info.class"), None);
        assert_eq!(class_name_of("META-INF/versions/9/com/acme/Foo.class"), None);
        assert_eq!(class_name_of("com/acme/readme.txt"), None);
    }

    #[test]
    fn test_extract_archive() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("widgets-1.0.jar");
        write_jar(
            &jar,
            &[
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n".to_vec()),
                ("com/acme/Widget.class", class_bytes("com/acme/Widget", "count", "bar")),
                ("com/acme/Widget$1.class", class_bytes("com/acme/Widget$1", "x", "y")),
                ("com/acme/Broken.class", vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 0x34]),
            ],
        );

        let records = extract_archive(&jar, &ArchiveLimits::default()).unwrap();
        let names: Vec<(&str, SymbolKind)> = records
            .iter()
            .map(|r| (r.qualified_name.as_str(), r.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("com.acme.Widget", SymbolKind::Class),
                ("com.acme.Widget.count", SymbolKind::Field),
                ("com.acme.Widget.bar", SymbolKind::Method),
            ]
        );
        assert!(records.iter().all(|r| r.origin == SymbolOrigin::Archive));
        assert_eq!(records[0].location.path, jar);
    }

    #[test]
    fn test_entry_limits() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("many.jar");
        write_jar(
            &jar,
            &[
                ("a/A.class", class_bytes("a/A", "f", "m")),
                ("a/B.class", class_bytes("a/B", "f", "m")),
            ],
        );

        let limits = ArchiveLimits {
            max_entries: 1,
            ..ArchiveLimits::default()
        };
        let records = extract_archive(&jar, &limits).unwrap();
        assert!(records.iter().all(|r| r.qualified_name.starts_with("a.A")));

        let limits = ArchiveLimits {
            max_entry_size: 8,
            ..ArchiveLimits::default()
        };
        assert!(extract_archive(&jar, &limits).unwrap().is_empty());
    }

    #[test]
    fn test_extract_class_dir() {
        let dir = tempdir().unwrap();
        let classes = dir.path().join("build/classes/groovy/main");
        std::fs::create_dir_all(classes.join("com/acme")).unwrap();
        std::fs::write(
            classes.join("com/acme/Widget.class"),
            class_bytes("com/acme/Widget", "count", "bar"),
        )
        .unwrap();
        std::fs::write(
            classes.join("com/acme/Widget$1.class"),
            class_bytes("com/acme/Widget$1", "x", "y"),
        )
        .unwrap();
        std::fs::write(classes.join("com/acme/notes.txt"), b"ignored").unwrap();

        let records = extract_class_dir(&classes, &ArchiveLimits::default()).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["com.acme.Widget", "com.acme.Widget.count", "com.acme.Widget.bar"]);
        assert!(records.iter().all(|r| r.origin == SymbolOrigin::Archive));
        assert_eq!(records[0].location.path, classes);

        let limits = ArchiveLimits {
            max_entries: 0,
            ..ArchiveLimits::default()
        };
        assert!(extract_class_dir(&classes, &limits).unwrap().is_empty());
        assert!(extract_class_dir(&dir.path().join("missing"), &limits).is_err());
    }

    #[test]
    fn test_not_an_archive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bogus.jar");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(extract_archive(&path, &ArchiveLimits::default()).is_err());
    }
}
