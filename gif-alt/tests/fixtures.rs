use pretty_assertions::assert_eq;

use gif_alt::{find_gif_images, GifImage};

#[test]
fn fixtures_match_expected_output() {
    let cases = [
        (
            "homepage",
            include_str!("fixtures/html/homepage.html"),
            include_str!("fixtures/expected/homepage.json"),
        ),
        (
            "no-gifs",
            include_str!("fixtures/html/no-gifs.html"),
            include_str!("fixtures/expected/no-gifs.json"),
        ),
    ];

    for (name, html, expected) in cases {
        let expected: Vec<GifImage> =
            serde_json::from_str(expected).unwrap_or_else(|err| panic!("{name}: {err}"));
        assert_eq!(find_gif_images(html), expected, "fixture mismatch: {name}");
    }
}
