//! Slides generator tool: turns Tailwind-flavoured HTML into a `.pptx` deck. Walks `.ppt-slide`
//! elements and lays out a title/paragraph/bullet textbox per slide. No OOXML-authoring crate
//! covers this, so the archive is built directly with `zip`: one text box per
//! title/paragraph/bullet, positioned in EMU at fixed inch offsets.

use std::io::Write;

use async_trait::async_trait;
use okcvm_protocol::ToolResult;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::context::ToolContext;
use crate::spec::ToolSpec;
use crate::trait_def::Tool;

pub const TOOL_SLIDES_GENERATOR: &str = "mshtools-slides_generator";

const EMU_PER_INCH: i64 = 914_400;

fn inches(value: f64) -> i64 {
    (value * EMU_PER_INCH as f64).round() as i64
}

struct SlideContent {
    title: String,
    paragraphs: Vec<String>,
    bullets: Vec<String>,
}

fn parse_slides(html: &str) -> Result<Vec<SlideContent>, String> {
    let document = Html::parse_fragment(html);
    let slide_selector = Selector::parse(".ppt-slide").unwrap();
    let heading_selector = Selector::parse("h1, h2, h3").unwrap();
    let paragraph_selector = Selector::parse("p").unwrap();
    let item_selector = Selector::parse("li").unwrap();

    let slide_elements: Vec<_> = document.select(&slide_selector).collect();
    if slide_elements.is_empty() {
        return Err("No elements with class 'ppt-slide' were found in the HTML".to_string());
    }

    let mut slides = Vec::new();
    for (index, element) in slide_elements.into_iter().enumerate() {
        let title = element
            .select(&heading_selector)
            .next()
            .map(|h| h.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("Slide {}", index + 1));

        let paragraphs: Vec<String> = element
            .select(&paragraph_selector)
            .filter_map(|p| {
                let text = p.text().collect::<String>().trim().to_string();
                (!text.is_empty()).then_some(text)
            })
            .collect();

        let bullets: Vec<String> = element
            .select(&item_selector)
            .filter_map(|li| {
                let text = li.text().collect::<String>().trim().to_string();
                (!text.is_empty()).then_some(text)
            })
            .collect();

        slides.push(SlideContent {
            title,
            paragraphs,
            bullets,
        });
    }
    Ok(slides)
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// One `<p:sp>` text box at the given inch offsets, matching `_add_textbox`'s layout.
fn textbox_xml(shape_id: u32, text: &str, left: f64, top: f64, width: f64, height: f64, font_pt: u32) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="TextBox {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr>
<p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr>
<p:txBody><a:bodyPr wrap="square"/><a:p><a:r><a:rPr lang="en-US" sz="{sz}"/><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp>"#,
        id = shape_id,
        x = inches(left),
        y = inches(top),
        cx = inches(width),
        cy = inches(height),
        sz = font_pt * 100,
        text = escape_xml(text),
    )
}

fn slide_xml(slide: &SlideContent) -> (String, Vec<String>) {
    let mut shape_id = 2;
    let mut shapes = Vec::new();
    let mut preview_bullets = Vec::new();

    if !slide.title.is_empty() {
        shapes.push(textbox_xml(shape_id, &slide.title, 0.5, 0.3, 9.0, 1.2, 40));
        shape_id += 1;
    }
    for (idx, text) in slide.paragraphs.iter().enumerate() {
        shapes.push(textbox_xml(
            shape_id,
            text,
            0.8,
            1.8 + 0.8 * idx as f64,
            8.5,
            0.7,
            24,
        ));
        shape_id += 1;
        preview_bullets.push(text.clone());
    }
    for (idx, bullet) in slide.bullets.iter().enumerate() {
        shapes.push(textbox_xml(
            shape_id,
            &format!("\u{2022} {bullet}"),
            1.0,
            2.5 + 0.6 * idx as f64,
            8.0,
            0.6,
            22,
        ));
        shape_id += 1;
        preview_bullets.push(bullet.clone());
    }

    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
<p:cSld><p:spTree>
<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>
<p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>
{shapes}
</p:spTree></p:cSld>
<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr>
</p:sld>"#,
        shapes = shapes.join("\n"),
    );
    (xml, preview_bullets)
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>
<Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"/>
<Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/>
<Override PartName="/ppt/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/>
{slide_overrides}
</Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="ppt/presentation.xml"/>
</Relationships>"#;

const SLIDE_MASTER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sldMaster xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
<p:cSld><p:spTree>
<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>
<p:grpSpPr/>
</p:spTree></p:cSld>
<p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/>
<p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"/></p:sldLayoutIdLst>
</p:sldMaster>"#;

const SLIDE_MASTER_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme" Target="../theme/theme1.xml"/>
</Relationships>"#;

const SLIDE_LAYOUT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sldLayout xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" type="blank">
<p:cSld name="Blank"><p:spTree>
<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>
<p:grpSpPr/>
</p:spTree></p:cSld>
</p:sldLayout>"#;

const SLIDE_LAYOUT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="../slideMasters/slideMaster1.xml"/>
</Relationships>"#;

const THEME_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="okcvm">
<a:themeElements>
<a:clrScheme name="okcvm"><a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1><a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1><a:dk2><a:srgbClr val="1F1F1F"/></a:dk2><a:lt2><a:srgbClr val="EEEEEE"/></a:lt2><a:accent1><a:srgbClr val="4472C4"/></a:accent1><a:accent2><a:srgbClr val="ED7D31"/></a:accent2><a:accent3><a:srgbClr val="A5A5A5"/></a:accent3><a:accent4><a:srgbClr val="FFC000"/></a:accent4><a:accent5><a:srgbClr val="5B9BD5"/></a:accent5><a:accent6><a:srgbClr val="70AD47"/></a:accent6><a:hlink><a:srgbClr val="0563C1"/></a:hlink><a:folHlink><a:srgbClr val="954F72"/></a:folHlink></a:clrScheme>
<a:fontScheme name="okcvm"><a:majorFont><a:latin typeface="Calibri"/></a:majorFont><a:minorFont><a:latin typeface="Calibri"/></a:minorFont></a:fontScheme>
<a:fmtScheme name="okcvm"><a:fillStyleLst><a:solidFill><a:schemeClr val="accent1"/></a:solidFill><a:solidFill><a:schemeClr val="accent1"/></a:solidFill><a:solidFill><a:schemeClr val="accent1"/></a:solidFill></a:fillStyleLst><a:lnStyleLst><a:ln><a:solidFill><a:schemeClr val="accent1"/></a:solidFill></a:ln><a:ln><a:solidFill><a:schemeClr val="accent1"/></a:solidFill></a:ln><a:ln><a:solidFill><a:schemeClr val="accent1"/></a:solidFill></a:ln></a:lnStyleLst><a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst><a:bgFillStyleLst><a:solidFill><a:schemeClr val="lt1"/></a:solidFill><a:solidFill><a:schemeClr val="lt1"/></a:solidFill><a:solidFill><a:schemeClr val="lt1"/></a:solidFill></a:bgFillStyleLst></a:fmtScheme>
</a:themeElements>
</a:theme>"#;

fn presentation_xml(slide_count: usize) -> String {
    let slide_id_list: String = (0..slide_count)
        .map(|i| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + i, i + 2))
        .collect::<Vec<_>>()
        .join("");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:presentation xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
<p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>
<p:sldIdLst>{slide_id_list}</p:sldIdLst>
<p:sldSz cx="9144000" cy="6858000"/>
<p:notesSz cx="6858000" cy="9144000"/>
</p:presentation>"#
    )
}

fn presentation_rels_xml(slide_count: usize) -> String {
    let mut rels = String::from(
        r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="slideMasters/slideMaster1.xml"/>"#,
    );
    for i in 0..slide_count {
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide{}.xml"/>"#,
            i + 2,
            i + 1
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
    )
}

fn build_pptx(slides: &[SlideContent]) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut zip = ZipWriter::new(std::io::Cursor::new(&mut buffer));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let slide_overrides: String = (0..slides.len())
        .map(|i| {
            format!(
                r#"<Override PartName="/ppt/slides/slide{}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#,
                i + 1
            )
        })
        .collect();
    let content_types = CONTENT_TYPES_XML.replace("{slide_overrides}", &slide_overrides);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(content_types.as_bytes())?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(ROOT_RELS_XML.as_bytes())?;

    zip.start_file("ppt/presentation.xml", options)?;
    zip.write_all(presentation_xml(slides.len()).as_bytes())?;

    zip.start_file("ppt/_rels/presentation.xml.rels", options)?;
    zip.write_all(presentation_rels_xml(slides.len()).as_bytes())?;

    zip.start_file("ppt/slideMasters/slideMaster1.xml", options)?;
    zip.write_all(SLIDE_MASTER_XML.as_bytes())?;

    zip.start_file("ppt/slideMasters/_rels/slideMaster1.xml.rels", options)?;
    zip.write_all(SLIDE_MASTER_RELS_XML.as_bytes())?;

    zip.start_file("ppt/slideLayouts/slideLayout1.xml", options)?;
    zip.write_all(SLIDE_LAYOUT_XML.as_bytes())?;

    zip.start_file("ppt/slideLayouts/_rels/slideLayout1.xml.rels", options)?;
    zip.write_all(SLIDE_LAYOUT_RELS_XML.as_bytes())?;

    zip.start_file("ppt/theme/theme1.xml", options)?;
    zip.write_all(THEME_XML.as_bytes())?;

    for (index, slide) in slides.iter().enumerate() {
        let (xml, _) = slide_xml(slide);
        zip.start_file(format!("ppt/slides/slide{}.xml", index + 1), options)?;
        zip.write_all(xml.as_bytes())?;
        zip.start_file(
            format!("ppt/slides/_rels/slide{}.xml.rels", index + 1),
            options,
        )?;
        zip.write_all(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"/>"#
                .as_bytes(),
        )?;
    }

    zip.finish()?;
    Ok(buffer)
}

pub struct SlidesGeneratorTool;

#[async_trait]
impl Tool for SlidesGeneratorTool {
    fn name(&self) -> &str {
        TOOL_SLIDES_GENERATOR
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_SLIDES_GENERATOR.to_string(),
            description: Some(
                "Parses HTML elements with class 'ppt-slide' into a .pptx deck and returns a \
                 slide-by-slide preview."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "html": {"type": "string"},
                    "output_path": {"type": "string"}
                },
                "required": ["html"]
            }),
        }
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let html = match args
            .get("html")
            .or_else(|| args.get("content"))
            .and_then(|v| v.as_str())
        {
            Some(h) if !h.is_empty() => h,
            _ => return ToolResult::failure("'html' is required"),
        };

        let slides = match parse_slides(html) {
            Ok(s) => s,
            Err(e) => return ToolResult::failure(e),
        };

        let pptx = match build_pptx(&slides) {
            Ok(bytes) => bytes,
            Err(e) => return ToolResult::failure(format!("failed to assemble pptx: {e}")),
        };

        let requested_path = args.get("output_path").and_then(|v| v.as_str());
        let target = match requested_path {
            Some(p) => match ctx.workspace.resolve(p) {
                Ok(resolved) => resolved,
                Err(e) => return ToolResult::failure(e.to_string()),
            },
            None => {
                let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
                let dir = ctx.workspace.internal_root.join("generated_slides");
                dir.join(format!("slides-{timestamp}.pptx"))
            }
        };
        if let Some(parent) = target.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolResult::failure(format!("failed to create output directory: {e}"));
            }
        }
        if let Err(e) = std::fs::write(&target, &pptx) {
            return ToolResult::failure(format!("failed to write pptx: {e}"));
        }

        let preview_slides: Vec<Value> = slides
            .iter()
            .map(|slide| {
                let mut bullets = slide.paragraphs.clone();
                bullets.extend(slide.bullets.iter().cloned());
                json!({"title": slide.title, "bullets": bullets})
            })
            .collect();

        ToolResult {
            success: true,
            output: Some(format!("Slides saved to {}", target.display())),
            data: Some(json!({"path": target.display().to_string(), "slides": preview_slides})),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SessionToolState;
    use okcvm_workspace::{WorkspaceManager, WorkspaceManagerConfig};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn ctx() -> (tempfile::TempDir, ToolContext) {
        let dir = tempdir().unwrap();
        let manager = WorkspaceManager::new(WorkspaceManagerConfig {
            base_dir: dir.path().to_path_buf(),
            mount_root: "/mnt".to_string(),
            snapshots_enabled: false,
            max_reported_snapshots: 20,
        });
        let ws = manager.create_workspace().unwrap();
        (
            dir,
            ToolContext::new(Arc::new(ws), Arc::new(SessionToolState::default())),
        )
    }

    const SAMPLE_HTML: &str = r#"
        <div class="ppt-slide"><h1>Quarterly Update</h1><p>Revenue grew 12%.</p><ul><li>New markets</li><li>Lower churn</li></ul></div>
        <div class="ppt-slide"><h2>Roadmap</h2><p>Ship the mobile app.</p></div>
    "#;

    #[tokio::test]
    async fn builds_a_pptx_with_one_slide_per_element() {
        let (_dir, ctx) = ctx();
        let tool = SlidesGeneratorTool;
        let result = tool
            .call(
                json!({"html": SAMPLE_HTML, "output_path": format!("{}deck.pptx", ctx.workspace.mount)}),
                &ctx,
            )
            .await;
        assert!(result.success, "{:?}", result.error);
        let data = result.data.unwrap();
        let slides = data["slides"].as_array().unwrap();
        assert_eq!(slides.len(), 2);
        assert_eq!(slides[0]["title"], "Quarterly Update");

        let path = ctx.workspace.internal_mount.join("deck.pptx");
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..2], b"PK");
    }

    #[tokio::test]
    async fn missing_ppt_slide_elements_fails() {
        let (_dir, ctx) = ctx();
        let tool = SlidesGeneratorTool;
        let result = tool
            .call(json!({"html": "<div>no slides here</div>"}), &ctx)
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn untitled_slide_falls_back_to_ordinal_title() {
        let (_dir, ctx) = ctx();
        let tool = SlidesGeneratorTool;
        let result = tool
            .call(
                json!({
                    "html": "<div class=\"ppt-slide\"><p>Just a paragraph</p></div>",
                    "output_path": format!("{}deck.pptx", ctx.workspace.mount)
                }),
                &ctx,
            )
            .await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["slides"][0]["title"], "Slide 1");
    }
}
