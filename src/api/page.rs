use crate::control::ControlSnapshot;

/// Landing page: toggles, motion status poller and the live stream.
pub(crate) fn render_index(
    snapshot: ControlSnapshot,
    target_class: &str,
    width: u32,
    height: u32,
) -> String {
    let title = format!("Live {} Detection", capitalize(target_class));
    let pir_caption = if snapshot.sensor_enabled {
        "Disable PIR Sensor"
    } else {
        "Enable PIR Sensor"
    };
    let buzzer_caption = if snapshot.actuator_enabled {
        "Disable Buzzer"
    } else {
        "Enable Buzzer"
    };
    let motion_text = if snapshot.motion_active {
        "Motion Detected!"
    } else {
        "No Motion"
    };

    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>
      body {{ font-family: Arial, sans-serif; text-align: center; background-color: #f0f0f0; }}
      h1 {{ color: #333; }}
      button {{ padding: 10px 20px; font-size: 16px; margin: 10px; }}
      img {{ border: 2px solid #444; margin-top: 10px; }}
      #motion-status {{ font-size: 20px; color: #d00; margin-top: 10px; }}
    </style>
  </head>
  <body>
    <h1>{title} Feed</h1>
    <form method="post">
      <button name="toggle_pir" value="1" type="submit">{pir_caption}</button>
      <button name="toggle_buzzer" value="1" type="submit">{buzzer_caption}</button>
    </form>
    <div id="motion-status">{motion_text}</div>
    <img src="/video_feed" width="{width}" height="{height}" alt="{title}">
    <script>
      function updateMotionStatus() {{
        fetch('/motion_status')
          .then(response => response.json())
          .then(data => {{
            document.getElementById('motion-status').innerText =
              data.motion ? 'Motion Detected!' : 'No Motion';
          }})
          .catch(() => {{}});
      }}
      setInterval(updateMotionStatus, 1000);
    </script>
  </body>
</html>
"#,
        title = escape(&title),
        pir_caption = pir_caption,
        buzzer_caption = buzzer_caption,
        motion_text = motion_text,
        width = width,
        height = height,
    )
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captions_follow_toggle_state() {
        let page = render_index(ControlSnapshot::default(), "cat", 640, 480);
        assert!(page.contains("<title>Live Cat Detection</title>"));
        assert!(page.contains("Disable PIR Sensor"));
        assert!(page.contains("Disable Buzzer"));
        assert!(page.contains(r#"src="/video_feed""#));

        let off = ControlSnapshot {
            sensor_enabled: false,
            actuator_enabled: false,
            motion_active: true,
        };
        let page = render_index(off, "cat", 640, 480);
        assert!(page.contains("Enable PIR Sensor"));
        assert!(page.contains("Enable Buzzer"));
        assert!(page.contains(r#"<div id="motion-status">Motion Detected!</div>"#));
    }

    #[test]
    fn target_class_is_escaped() {
        let page = render_index(ControlSnapshot::default(), "<b>", 1, 1);
        assert!(page.contains("Live &lt;b&gt; Detection"));

        let page = render_index(ControlSnapshot::default(), r#"cat" onerror="x"#, 1, 1);
        assert!(page.contains(r#"alt="Live Cat&quot; onerror=&quot;x Detection""#));
        assert!(!page.contains(r#"onerror="x"#));
    }
}
