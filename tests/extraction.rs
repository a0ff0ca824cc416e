use std::path::PathBuf;

use paperext::config::AppConfig;
use paperext::parser::ExtractionPipeline;
use paperext::utils::ExtractError;

const TEI_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TEI xmlns="http://www.tei-c.org/ns/1.0">
  <teiHeader>
    <fileDesc>
      <titleStmt><title>Service Parsed Paper</title></titleStmt>
      <sourceDesc><biblStruct>
        <analytic>
          <author><persName><forename>Mary</forename><surname>Johnson</surname></persName></author>
        </analytic>
        <monogr><title>AI Journal</title><imprint><date when="2020-06-01"/></imprint></monogr>
      </biblStruct></sourceDesc>
    </fileDesc>
    <profileDesc><abstract><p>An abstract.</p></abstract></profileDesc>
  </teiHeader>
  <text>
    <body>
      <div><head>Introduction</head><p>Body text.</p>
        <formula type="display">E = mc^2</formula>
        <figure><head>Figure 1: Overview</head><figDesc>The overview figure</figDesc></figure>
        <figure type="table"><figDesc>Table 1: Results</figDesc><table>
          <row><cell>a</cell><cell>b</cell></row>
        </table></figure>
      </div>
    </body>
    <back><div type="references"><listBibl>
      <biblStruct>
        <analytic><title>Prior Work</title>
          <author><persName><forename>Alan</forename><surname>Turing</surname></persName></author>
        </analytic>
        <monogr><title>Old Journal</title><imprint><date when="1950"/></imprint></monogr>
        <idno type="DOI">10.1234/ai.2020.45.112</idno>
      </biblStruct>
    </listBibl></div></back>
  </text>
</TEI>"#;

fn config_with_endpoint(endpoint: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.extractor.endpoint_url = endpoint.to_string();
    config
}

fn write_temp(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
async fn missing_file_is_the_only_fatal_error() {
    let pipeline = ExtractionPipeline::new(AppConfig::default());
    let result = pipeline.extract("definitely/not/a/file.pdf").await;
    assert!(matches!(result, Err(ExtractError::NotFound(_))));
}

#[tokio::test]
async fn pdf_goes_through_the_service_when_available() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/processFulltextDocument")
        .with_status(200)
        .with_body(TEI_BODY)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(&dir, "paper.pdf", "%PDF-1.4 fake");

    let pipeline = ExtractionPipeline::new(config_with_endpoint(&server.url()));
    let content = pipeline.extract(&path).await.unwrap();

    mock.assert_async().await;
    assert_eq!(content.paper_info.title, "Service Parsed Paper");
    assert_eq!(content.paper_info.authors, vec!["Mary Johnson"]);
    assert_eq!(content.paper_info.year, 2020);
    assert_eq!(content.sections.len(), 1);
    assert_eq!(content.sections[0].title, "Introduction");
    assert_eq!(content.equations.len(), 1);
    assert_eq!(content.figures.len(), 1);
    assert_eq!(content.figures[0].id, "fig-1");
    assert_eq!(content.tables.len(), 1);
    assert_eq!(content.citations.len(), 1);
    assert_eq!(content.citations[0].doi.as_deref(), Some("10.1234/ai.2020.45.112"));
    assert_eq!(content.citations[0].year, Some(1950));
}

#[tokio::test]
async fn service_failure_degrades_to_pdf_stub() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/processFulltextDocument")
        .with_status(503)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(&dir, "broken.pdf", "this is not a real pdf");

    let pipeline = ExtractionPipeline::new(config_with_endpoint(&server.url()));
    let content = pipeline.extract(&path).await.unwrap();

    // 降级安全：标题非空，章节至少一个
    assert!(!content.paper_info.title.is_empty());
    assert!(!content.sections.is_empty());
}

#[tokio::test]
async fn malformed_tei_from_service_degrades_without_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/processFulltextDocument")
        .with_status(200)
        .with_body("<TEI><teiHeader><unterminated")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(&dir, "odd.pdf", "garbage bytes");

    let pipeline = ExtractionPipeline::new(config_with_endpoint(&server.url()));
    let content = pipeline.extract(&path).await.unwrap();
    assert!(!content.paper_info.title.is_empty());
    assert!(!content.sections.is_empty());
}

#[tokio::test]
async fn markdown_never_touches_the_service() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(
        &dir,
        "paper.md",
        "# Markdown Paper\n\nAbstract: short abstract.\n\n## Introduction\n\nHello.\n\n### Details\n\nMore.\n",
    );

    // 端点不可达也无妨：非PDF格式不经过服务
    let pipeline = ExtractionPipeline::new(config_with_endpoint("http://127.0.0.1:9"));
    let content = pipeline.extract(&path).await.unwrap();

    assert_eq!(content.paper_info.title, "Markdown Paper");
    assert_eq!(content.paper_info.abstract_text, "short abstract.");
    assert_eq!(content.sections.len(), 1);
    assert_eq!(content.sections[0].subsections[0].title, "Details");
}

#[tokio::test]
async fn latex_degrades_without_service() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(
        &dir,
        "paper.tex",
        "\\title{Latex Paper}\n\\author{A Writer}\n\\begin{document}\n\\begin{abstract}Brief.\\end{abstract}\n\\section{One}\nText one.\n\\end{document}\n",
    );

    let pipeline = ExtractionPipeline::new(AppConfig::default());
    let content = pipeline.extract(&path).await.unwrap();

    assert_eq!(content.paper_info.title, "Latex Paper");
    assert_eq!(content.paper_info.authors, vec!["A Writer"]);
    assert_eq!(content.sections[0].title, "One");
}

#[tokio::test]
async fn unknown_extension_wraps_text_as_single_section() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(&dir, "notes.txt", "plain text body that has no structure at all");

    let pipeline = ExtractionPipeline::new(AppConfig::default());
    let content = pipeline.extract(&path).await.unwrap();

    assert_eq!(content.paper_info.title, "notes");
    assert_eq!(content.sections.len(), 1);
    assert!(content.sections[0].content.contains("no structure"));

    let weird = write_temp(&dir, "data.xyz", "unrecognized format contents");
    let content = pipeline.extract(&weird).await.unwrap();
    assert_eq!(content.paper_info.title, "data");
    assert!(!content.sections.is_empty());
}

#[tokio::test]
async fn options_gate_the_element_lists() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(
        &dir,
        "paper.md",
        "# Gated\n\n## Body\n\nThe loss $L(x) = a + b$ appears inline.\n",
    );

    let mut config = AppConfig::default();
    config.extractor.include_formulas = false;
    config.extractor.include_figures = false;
    config.extractor.include_citations = false;
    let pipeline = ExtractionPipeline::new(config);
    let content = pipeline.extract(&path).await.unwrap();

    assert!(content.equations.is_empty());
    assert!(content.figures.is_empty());
    assert!(content.tables.is_empty());
    assert!(content.citations.is_empty());
    assert!(content.raw_text.is_none());
}

#[tokio::test]
async fn raw_text_option_attaches_recovered_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(&dir, "paper.md", "# Raw\n\n## S\n\nvisible body\n");

    let mut config = AppConfig::default();
    config.extractor.include_raw_text = true;
    let pipeline = ExtractionPipeline::new(config);
    let content = pipeline.extract(&path).await.unwrap();

    let raw = content.raw_text.unwrap();
    assert!(raw.contains("visible body"));
}

#[tokio::test]
async fn section_invariants_hold_for_every_format() {
    let dir = tempfile::tempdir().unwrap();
    let files = [
        write_temp(&dir, "a.md", "# T\n\n## A\n\nx\n\n### B\n\ny\n"),
        write_temp(&dir, "b.tex", "\\title{T}\\section{A}x\\subsection{B}y"),
        write_temp(&dir, "c.txt", "some plain file"),
    ];

    let pipeline = ExtractionPipeline::new(AppConfig::default());
    for path in files {
        let content = pipeline.extract(&path).await.unwrap();
        assert!(!content.sections.is_empty());
        fn check(section: &paperext::parser::PaperSection) {
            for child in &section.subsections {
                assert_eq!(child.level, section.level + 1);
                assert!(child.id.starts_with(&section.id));
                check(child);
            }
        }
        for section in &content.sections {
            assert_eq!(section.level, 1);
            check(section);
        }
    }
}
