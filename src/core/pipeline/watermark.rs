use regex::Regex;

const WATERMARK: &str = concat!(
    "\n\n<!-- TO REMOVE: -->\n",
    "<div style=\"border:dotted red 3px;background-color:pink;padding:5px 10px;font-size:20px;",
    "display:block;opacity:0.8;z-index:10000;font-family:sans-serif;width:75%;position:fixed;",
    "left:50%;bottom:0;margin-left:-37.5%;\">This page is not production-ready yet",
    "<p style=\"font-size:14px\">Resolve any remaining validation errors by adding ",
    "<b>#development=1</b> to the end of the URL and checking the browser console, ",
    "<br>or by running the <a href=\"https://search.google.com/test/amp\">AMP test</a>.",
    "<br><a href=\"https://amp.dev/documentation/guides-and-tutorials/learn/validation-workflow/validate_amp\">",
    "Details about AMP validation</a><br><br>To remove this message, look for 'TO REMOVE' in the ",
    "source of this page and delete the block below it.</p></div>\n\n",
);

const BODY_TAG: &str = r"(?i)<body[^>]*>";

/// Insert the development notice right after the first `<body ...>` tag. Markup
/// without a body tag is returned unchanged.
pub fn add_watermark(html: &str) -> String {
    let Ok(body_tag) = Regex::new(BODY_TAG) else {
        return html.to_string();
    };
    match body_tag.find(html) {
        Some(tag) => {
            let mut out = String::with_capacity(html.len() + WATERMARK.len());
            out.push_str(&html[..tag.end()]);
            out.push_str(WATERMARK);
            out.push_str(&html[tag.end()..]);
            out
        }
        None => html.to_string(),
    }
}
