//! Package metadata available at runtime.

/// Something the package needs to build or run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub name: &'static str,
    pub role: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub authors: Vec<&'static str>,
    pub license: &'static str,
    pub classifiers: &'static [&'static str],
    pub requires: Vec<Requirement>,
}

const CLASSIFIERS: &[&str] = &[
    "License :: OSI Approved :: GNU General Public License (GPL)",
    "Programming Language :: Rust",
    "Development Status :: 1 - Planning",
    "Intended Audience :: Developers",
    "Topic :: Internet",
];

pub fn package() -> Package {
    Package {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        description: env!("CARGO_PKG_DESCRIPTION"),
        authors: env!("CARGO_PKG_AUTHORS")
            .split(':')
            .filter(|a| !a.is_empty())
            .collect(),
        license: env!("CARGO_PKG_LICENSE"),
        classifiers: CLASSIFIERS,
        requires: vec![
            Requirement {
                name: "cargo",
                role: "build tool",
            },
            Requirement {
                name: "tokio",
                role: "event-driven networking",
            },
            Requirement {
                name: "srouter-proto",
                role: "length-type protocol codec",
            },
        ],
    }
}
