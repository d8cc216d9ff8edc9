//! Embedded demo page

use super::{EXAMPLES, SLIDERS};

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Iris Classifier</title>
    <style>
        body { font-family: system-ui, sans-serif; max-width: 640px; margin: 2rem auto; color: #1f2937; }
        .slider { margin: 1rem 0; }
        .slider label { display: flex; justify-content: space-between; }
        input[type=range] { width: 100%; }
        .examples button { margin-right: .5rem; padding: .3rem .8rem; }
        #output { margin-top: 1.5rem; font-size: 1.3rem; min-height: 2rem; }
    </style>
</head>
<body>
    <h1>Iris Classifier</h1>
    <p>Move the sliders to describe a flower.</p>
    <div id="sliders">{{SLIDERS}}</div>
    <div class="examples">Examples: {{EXAMPLES}}</div>
    <div id="output"></div>
    <script>
        const keys = {{KEYS}};
        async function predict() {
            const body = {};
            for (const k of keys) {
                const v = parseFloat(document.getElementById(k).value);
                body[k] = v;
                document.getElementById(k + "_value").textContent = v.toFixed(1);
            }
            const res = await fetch("/api/predict", {
                method: "POST",
                headers: { "Content-Type": "application/json" },
                body: JSON.stringify(body),
            });
            const data = await res.json();
            const out = document.getElementById("output");
            out.innerHTML = res.ok
                ? data.output.replace(/\*\*(.+?)\*\*/, "<strong>$1</strong>")
                : "Error: " + data.message;
        }
        function setExample(values) {
            keys.forEach((k, i) => { document.getElementById(k).value = values[i]; });
            predict();
        }
        keys.forEach(k => document.getElementById(k).addEventListener("input", predict));
        predict();
    </script>
</body>
</html>
"#;

/// Render the page with the slider and example definitions filled in
pub fn render() -> String {
    let sliders: String = SLIDERS
        .iter()
        .map(|s| {
            format!(
                r#"<div class="slider"><label for="{key}">{label} <span id="{key}_value">{default:.1}</span></label><input type="range" id="{key}" min="{min}" max="{max}" step="{step}" value="{default}"></div>"#,
                key = s.key,
                label = s.label,
                min = s.min,
                max = s.max,
                step = s.step,
                default = s.default,
            )
        })
        .collect();

    let examples: String = EXAMPLES
        .iter()
        .map(|e| {
            let values: Vec<String> = e.features.iter().map(|v| v.to_string()).collect();
            format!(
                r#"<button onclick="setExample([{}])">{}</button>"#,
                values.join(","),
                e.name
            )
        })
        .collect();

    let keys: Vec<String> = SLIDERS.iter().map(|s| format!("\"{}\"", s.key)).collect();

    TEMPLATE
        .replace("{{SLIDERS}}", &sliders)
        .replace("{{EXAMPLES}}", &examples)
        .replace("{{KEYS}}", &format!("[{}]", keys.join(",")))
}
