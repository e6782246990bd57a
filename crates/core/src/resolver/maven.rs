//! Maven projects: `pom.xml` reactor, property interpolation and the local
//! repository layout.

use super::{MAVEN_MARKER, ResolvedClasspath};
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

static PROPERTY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("property pattern"));

#[derive(Debug, Clone, Default, Deserialize)]
struct Pom {
    #[serde(rename = "groupId")]
    group_id: Option<String>,
    #[serde(rename = "artifactId")]
    artifact_id: Option<String>,
    version: Option<String>,
    parent: Option<Parent>,
    #[serde(default)]
    properties: HashMap<String, String>,
    #[serde(default)]
    modules: Modules,
    #[serde(default)]
    dependencies: Dependencies,
    #[serde(rename = "dependencyManagement", default)]
    dependency_management: DependencyManagement,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Parent {
    #[serde(rename = "groupId")]
    group_id: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Modules {
    #[serde(rename = "module", default)]
    items: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Dependencies {
    #[serde(rename = "dependency", default)]
    items: Vec<PomDependency>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DependencyManagement {
    #[serde(default)]
    dependencies: Dependencies,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PomDependency {
    #[serde(rename = "groupId")]
    group_id: Option<String>,
    #[serde(rename = "artifactId")]
    artifact_id: Option<String>,
    version: Option<String>,
    scope: Option<String>,
    #[serde(rename = "type")]
    packaging: Option<String>,
    classifier: Option<String>,
    #[serde(rename = "systemPath")]
    system_path: Option<String>,
}

fn read_pom(path: &Path) -> Result<Pom, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    from_str::<Pom>(&text).map_err(|e: quick_xml::DeError| e.to_string())
}

impl Pom {
    fn group(&self) -> Option<&str> {
        self.group_id
            .as_deref()
            .or_else(|| self.parent.as_ref().and_then(|p| p.group_id.as_deref()))
    }

    fn project_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .or_else(|| self.parent.as_ref().and_then(|p| p.version.as_deref()))
    }

    fn property(&self, name: &str) -> Option<String> {
        match name {
            "project.version" | "pom.version" | "version" => {
                self.project_version().map(str::to_string)
            }
            "project.groupId" | "pom.groupId" => self.group().map(str::to_string),
            "project.artifactId" => self.artifact_id.clone(),
            "project.parent.version" => self.parent.as_ref().and_then(|p| p.version.clone()),
            _ => self.properties.get(name).cloned(),
        }
    }

    /// Expands `${...}` references; unknown properties are left in place.
    fn interpolate(&self, value: &str) -> String {
        let mut current = value.to_string();
        // Properties may refer to other properties.
        for _ in 0..4 {
            if !current.contains("${") {
                break;
            }
            current = PROPERTY
                .replace_all(&current, |caps: &regex::Captures<'_>| {
                    self.property(&caps[1])
                        .unwrap_or_else(|| caps[0].to_string())
                })
                .into_owned();
        }
        current
    }

    fn managed_version(&self, group: &str, artifact: &str) -> Option<String> {
        self.dependency_management
            .dependencies
            .items
            .iter()
            .find(|d| {
                d.group_id.as_deref() == Some(group) && d.artifact_id.as_deref() == Some(artifact)
            })
            .and_then(|d| d.version.as_deref())
            .map(|v| self.interpolate(v))
    }
}

/// `<repo>/<group as path>/<artifact>/<version>/<artifact>-<version>[-<classifier>].jar`
pub(super) fn artifact_path(
    repo: &Path,
    group: &str,
    artifact: &str,
    version: &str,
    classifier: Option<&str>,
) -> PathBuf {
    let file = match classifier {
        Some(c) => format!("{artifact}-{version}-{c}.jar"),
        None => format!("{artifact}-{version}.jar"),
    };
    let mut path = repo.to_path_buf();
    path.extend(group.split('.'));
    path.join(artifact).join(version).join(file)
}

/// Reactor module directories (root first) and their poms.
pub(super) fn layout(dir: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut modules = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(module) = pending.pop() {
        if modules.contains(&module) {
            continue;
        }
        let pom_path = module.join(MAVEN_MARKER);
        if !pom_path.is_file() {
            continue;
        }
        if let Ok(pom) = read_pom(&pom_path) {
            // Reverse so modules come out in declaration order.
            for child in pom.modules.items.iter().rev() {
                pending.push(module.join(child.trim()));
            }
        }
        modules.push(module);
    }
    if modules.is_empty() {
        modules.push(dir.to_path_buf());
    }
    let descriptors = modules
        .iter()
        .map(|m| m.join(MAVEN_MARKER))
        .filter(|p| p.is_file())
        .collect();
    (modules, descriptors)
}

pub(super) fn resolve(
    dir: &Path,
    modules: &[PathBuf],
    repo: &Path,
    classpath: &mut ResolvedClasspath,
) {
    let mut poms = Vec::new();
    for module in modules {
        let pom_path = module.join(MAVEN_MARKER);
        match read_pom(&pom_path) {
            Ok(pom) => poms.push((module.clone(), pom)),
            Err(e) => classpath.warn(
                pom_path.display().to_string(),
                format!("unreadable pom: {e}"),
            ),
        }
    }

    // Modules of this build resolve to their own output directory.
    let reactor: HashMap<(String, String), PathBuf> = poms
        .iter()
        .filter_map(|(module, pom)| {
            let group = pom.group()?.to_string();
            let artifact = pom.artifact_id.clone()?;
            Some(((group, artifact), module.clone()))
        })
        .collect();
    let root_pom = poms
        .iter()
        .find(|(module, _)| module == dir)
        .map(|(_, pom)| pom.clone())
        .unwrap_or_default();

    for (_, pom) in &poms {
        for dep in &pom.dependencies.items {
            resolve_dependency(pom, &root_pom, dep, &reactor, repo, classpath);
        }
    }
}

fn resolve_dependency(
    pom: &Pom,
    root_pom: &Pom,
    dep: &PomDependency,
    reactor: &HashMap<(String, String), PathBuf>,
    repo: &Path,
    classpath: &mut ResolvedClasspath,
) {
    let scope = dep.scope.as_deref().unwrap_or("compile");
    if matches!(scope, "test" | "import") || dep.packaging.as_deref() == Some("pom") {
        return;
    }
    let (Some(group), Some(artifact)) = (
        dep.group_id.as_deref().map(|g| pom.interpolate(g)),
        dep.artifact_id.as_deref().map(|a| pom.interpolate(a)),
    ) else {
        let partial = format!(
            "{}:{}",
            dep.group_id.as_deref().unwrap_or("?"),
            dep.artifact_id.as_deref().unwrap_or("?")
        );
        classpath.warn(partial, "dependency is missing groupId or artifactId");
        return;
    };

    if let Some(module) = reactor.get(&(group.clone(), artifact.clone())) {
        let classes = module.join("target/classes");
        if classes.is_dir() {
            classpath.push(classes);
        } else {
            classpath.warn(format!("{group}:{artifact}"), "module has no compiled classes yet");
        }
        return;
    }

    if scope == "system" {
        match dep.system_path.as_deref().map(|p| PathBuf::from(pom.interpolate(p))) {
            Some(path) if path.is_file() => classpath.push(path),
            _ => classpath.warn(format!("{group}:{artifact}"), "systemPath does not exist"),
        }
        return;
    }

    let version = dep
        .version
        .as_deref()
        .map(|v| pom.interpolate(v))
        .or_else(|| pom.managed_version(&group, &artifact))
        .or_else(|| root_pom.managed_version(&group, &artifact));
    let Some(version) = version else {
        classpath.warn(format!("{group}:{artifact}"), "no version declared or managed");
        return;
    };
    let coordinate = format!("{group}:{artifact}:{version}");
    if version.contains("${") {
        classpath.warn(coordinate, "version refers to an undefined property");
        return;
    }

    let jar = artifact_path(repo, &group, &artifact, &version, dep.classifier.as_deref());
    if jar.is_file() {
        classpath.push(jar);
    } else {
        classpath.warn(coordinate, "not found in the Maven repository");
    }
}

#[cfg(test)]
mod tests {
    use super::super::DependencyResolver;
    use super::*;
    use groovyscope_api::BuildSystemKind;
    use tempfile::tempdir;

    const POM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <modelVersion>4.0.0</modelVersion>
  <parent>
    <groupId>org.acme</groupId>
    <artifactId>acme-parent</artifactId>
    <version>7</version>
  </parent>
  <artifactId>demo</artifactId>
  <version>1.4.0</version>
  <properties>
    <groovy.version>4.0.21</groovy.version>
    <commons.version>${lang.version}</commons.version>
    <lang.version>3.14.0</lang.version>
  </properties>
  <dependencyManagement>
    <dependencies>
      <dependency>
        <groupId>com.google.guava</groupId>
        <artifactId>guava</artifactId>
        <version>33.0.0-jre</version>
      </dependency>
    </dependencies>
  </dependencyManagement>
  <dependencies>
    <dependency>
      <groupId>org.apache.groovy</groupId>
      <artifactId>groovy</artifactId>
      <version>${groovy.version}</version>
    </dependency>
    <dependency>
      <groupId>org.apache.commons</groupId>
      <artifactId>commons-lang3</artifactId>
      <version>${commons.version}</version>
    </dependency>
    <dependency>
      <groupId>com.google.guava</groupId>
      <artifactId>guava</artifactId>
    </dependency>
    <dependency>
      <groupId>${project.groupId}</groupId>
      <artifactId>sibling</artifactId>
      <version>${project.version}</version>
      <scope>provided</scope>
    </dependency>
    <dependency>
      <groupId>org.junit.jupiter</groupId>
      <artifactId>junit-jupiter</artifactId>
      <version>5.10.0</version>
      <scope>test</scope>
    </dependency>
    <dependency>
      <groupId>org.acme</groupId>
      <artifactId>undefined</artifactId>
      <version>${nope.version}</version>
    </dependency>
  </dependencies>
</project>
"#;

    fn install(repo: &Path, group: &str, artifact: &str, version: &str) -> PathBuf {
        let jar = artifact_path(repo, group, artifact, version, None);
        fs::create_dir_all(jar.parent().unwrap()).unwrap();
        fs::write(&jar, b"PK").unwrap();
        jar
    }

    #[test]
    fn test_artifact_path_layout() {
        assert_eq!(
            artifact_path(Path::new("/m2"), "org.apache.groovy", "groovy", "4.0.21", None),
            PathBuf::from("/m2/org/apache/groovy/groovy/4.0.21/groovy-4.0.21.jar")
        );
        assert_eq!(
            artifact_path(Path::new("/m2"), "a", "b", "1", Some("jdk8")),
            PathBuf::from("/m2/a/b/1/b-1-jdk8.jar")
        );
    }

    #[test]
    fn test_pom_resolution() {
        let ws = tempdir().unwrap();
        let home = tempdir().unwrap();
        let repo = home.path().join("m2");
        fs::write(ws.path().join("pom.xml"), POM).unwrap();

        let groovy = install(&repo, "org.apache.groovy", "groovy", "4.0.21");
        let lang = install(&repo, "org.apache.commons", "commons-lang3", "3.14.0");
        let guava = install(&repo, "com.google.guava", "guava", "33.0.0-jre");
        install(&repo, "org.junit.jupiter", "junit-jupiter", "5.10.0");

        let resolver =
            DependencyResolver::with_locations(ws.path(), home.path().join("gradle"), repo);
        let classpath = resolver.resolve();
        assert_eq!(classpath.build_system, BuildSystemKind::Maven);
        assert_eq!(classpath.entries, vec![groovy, lang, guava]);

        let coordinates: Vec<&str> = classpath
            .warnings
            .iter()
            .map(|w| w.coordinate.as_str())
            .collect();
        assert_eq!(
            coordinates,
            vec!["org.acme:sibling:1.4.0", "org.acme:undefined:${nope.version}"]
        );
    }

    #[test]
    fn test_reactor_modules_use_their_output() {
        let ws = tempdir().unwrap();
        let home = tempdir().unwrap();
        let root = ws.path();
        fs::write(
            root.join("pom.xml"),
            r#"<project>
  <groupId>org.acme</groupId>
  <artifactId>parent</artifactId>
  <version>1.0</version>
  <modules>
    <module>core</module>
    <module>app</module>
  </modules>
</project>"#,
        )
        .unwrap();
        fs::create_dir_all(root.join("core/target/classes")).unwrap();
        fs::write(
            root.join("core/pom.xml"),
            r#"<project>
  <parent><groupId>org.acme</groupId><version>1.0</version></parent>
  <artifactId>core</artifactId>
</project>"#,
        )
        .unwrap();
        fs::create_dir_all(root.join("app/src/main/groovy")).unwrap();
        fs::write(
            root.join("app/pom.xml"),
            r#"<project>
  <parent><groupId>org.acme</groupId><version>1.0</version></parent>
  <artifactId>app</artifactId>
  <dependencies>
    <dependency>
      <groupId>org.acme</groupId>
      <artifactId>core</artifactId>
      <version>${project.version}</version>
    </dependency>
  </dependencies>
</project>"#,
        )
        .unwrap();

        let resolver = DependencyResolver::with_locations(
            root,
            home.path().join("gradle"),
            home.path().join("m2"),
        );
        let classpath = resolver.resolve();
        assert_eq!(classpath.entries, vec![root.join("core/target/classes")]);
        assert!(classpath.warnings.is_empty());
        assert_eq!(
            resolver.source_directories(),
            vec![root.join("app/src/main/groovy")]
        );
    }

    #[test]
    fn test_malformed_pom_is_a_warning() {
        let ws = tempdir().unwrap();
        let home = tempdir().unwrap();
        fs::write(ws.path().join("pom.xml"), "<project><dependencies>").unwrap();
        let resolver = DependencyResolver::with_locations(
            ws.path(),
            home.path().join("gradle"),
            home.path().join("m2"),
        );
        let classpath = resolver.resolve();
        assert!(classpath.entries.is_empty());
        assert_eq!(classpath.warnings.len(), 1);
    }
}
