use std::env;

use youtube_downloader_pro::extract_youtube_urls;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: extract-links <file-path> [max-links]");
        std::process::exit(1);
    }

    let file_path = args[1].clone();
    let max_links = args
        .get(2)
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(usize::MAX);

    match std::fs::read_to_string(&file_path) {
        Ok(text) => print_links(&extract_youtube_urls(&text), max_links),
        Err(error) => {
            eprintln!("Error: {error}");
            std::process::exit(1);
        }
    }
}

fn print_links(links: &[String], max_links: usize) {
    println!("Found {} links", links.len());
    for link in links.iter().take(max_links) {
        println!("  {}", link);
    }
}
