//! Shared fixtures for the integration suites: in-memory module zips
//! and a wiremock stand-in for the upstream module proxy.

use std::io::{Cursor, Write};

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const MIT_LICENSE: &str = "Copyright (c) 2019 The Authors

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the \"Software\"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software.

THE SOFTWARE IS PROVIDED \"AS IS\", WITHOUT WARRANTY OF ANY KIND.
";

/// A module the mock proxy can serve.
pub struct TestModule {
    pub module_path: String,
    pub version: String,
    pub commit_time: String,
    pub files: Vec<(String, String)>,
}

impl TestModule {
    pub fn new(module_path: &str, version: &str, files: &[(&str, &str)]) -> Self {
        let mut files: Vec<(String, String)> =
            files.iter().map(|(p, c)| ((*p).to_string(), (*c).to_string())).collect();
        // Real module zips carry a go.mod; add one unless the fixture
        // overrides it.
        if !files.iter().any(|(p, _)| p == "go.mod") {
            files.push(("go.mod".to_string(), format!("module {module_path}\n")));
        }
        Self {
            module_path: module_path.to_string(),
            version: version.to_string(),
            commit_time: "2019-01-30T00:00:00Z".to_string(),
            files,
        }
    }

    /// The same module without any go.mod in its zip.
    pub fn without_go_mod(mut self) -> Self {
        self.files.retain(|(p, _)| p != "go.mod");
        self
    }

    pub fn zip_bytes(&self) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (file_path, contents) in &self.files {
            writer
                .start_file(
                    format!("{}@{}/{file_path}", self.module_path, self.version),
                    SimpleFileOptions::default(),
                )
                .expect("start zip entry");
            writer.write_all(contents.as_bytes()).expect("write zip entry");
        }
        writer.finish().expect("finish zip").into_inner()
    }

    fn go_mod(&self) -> String {
        self.files
            .iter()
            .find(|(p, _)| p == "go.mod")
            .map_or_else(|| format!("module {}\n", self.module_path), |(_, c)| c.clone())
    }
}

/// Mount proxy endpoints for the given modules; everything else 404s.
pub async fn start_proxy(modules: &[TestModule]) -> MockServer {
    let server = MockServer::start().await;
    for module in modules {
        let info_body = format!(
            r#"{{"Version":"{}","Time":"{}"}}"#,
            module.version, module.commit_time
        );
        let escaped = escape(&module.module_path);

        Mock::given(method("GET"))
            .and(path(format!("/{escaped}/@latest")))
            .respond_with(ResponseTemplate::new(200).set_body_string(info_body.clone()))
            .mount(&server)
            .await;
        for requested in ["master", module.version.as_str()] {
            Mock::given(method("GET"))
                .and(path(format!("/{escaped}/@v/{requested}.info")))
                .respond_with(ResponseTemplate::new(200).set_body_string(info_body.clone()))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path(format!("/{escaped}/@v/list")))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("{}\n", module.version)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/{escaped}/@v/{}.mod", module.version)))
            .respond_with(ResponseTemplate::new(200).set_body_string(module.go_mod()))
            .mount(&server)
            .await;
        let zip_bytes = module.zip_bytes();
        for verb in ["GET", "HEAD"] {
            Mock::given(method(verb))
                .and(path(format!("/{escaped}/@v/{}.zip", module.version)))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bytes.clone()))
                .mount(&server)
                .await;
        }
    }
    server
}

fn escape(module_path: &str) -> String {
    let mut out = String::new();
    for c in module_path.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
