//! REPLコマンド

/// REPLコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// ダンプ概要を表示
    Summary,
    /// 型別ヒストグラムを表示（上位N件）
    Histo(Option<usize>),
    /// オブジェクトの詳細を表示
    Obj(u32),
    /// 型の詳細とインスタンス一覧を表示
    Type(u32),
    /// オブジェクトの参照元を表示
    Referrers(u32),
    /// オブジェクトからの到達メモリを表示
    Reachable(u32),
    /// ゴルーチン一覧を表示
    Goroutines,
    /// ゴルーチンのスタックを表示
    Goroutine(String),
    /// グローバルルート一覧を表示
    Globals,
    /// その他のルート一覧を表示
    Others,
    /// 名前で型を検索
    Find(String),
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.trim().split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        let id_arg = |i: usize| parts.get(i).and_then(|s| s.parse::<u32>().ok());

        match parts[0] {
            "summary" | "sum" => Some(Command::Summary),
            "histo" | "hist" => {
                if parts.len() > 1 {
                    parts[1].parse().ok().map(|n| Command::Histo(Some(n)))
                } else {
                    Some(Command::Histo(None))
                }
            }
            "obj" | "o" => id_arg(1).map(Command::Obj),
            "type" | "t" => id_arg(1).map(Command::Type),
            "referrers" | "refs" => id_arg(1).map(Command::Referrers),
            "reachable" | "reach" => id_arg(1).map(Command::Reachable),
            "goroutines" | "gs" => Some(Command::Goroutines),
            "goroutine" | "g" => parts.get(1).map(|s| Command::Goroutine(s.to_string())),
            "globals" => Some(Command::Globals),
            "others" => Some(Command::Others),
            "find" | "f" => {
                if parts.len() > 1 {
                    Some(Command::Find(parts[1..].join(" ")))
                } else {
                    None
                }
            }
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("summary"), Some(Command::Summary));
        assert_eq!(Command::parse("histo"), Some(Command::Histo(None)));
        assert_eq!(Command::parse("histo 20"), Some(Command::Histo(Some(20))));
        assert_eq!(Command::parse("obj 5"), Some(Command::Obj(5)));
        assert_eq!(Command::parse("refs 5"), Some(Command::Referrers(5)));
        assert_eq!(
            Command::parse("g 0xc000"),
            Some(Command::Goroutine("0xc000".to_string()))
        );
        assert_eq!(
            Command::parse("find main.Node"),
            Some(Command::Find("main.Node".to_string()))
        );
        assert_eq!(Command::parse("quit"), Some(Command::Quit));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("obj"), None);
        assert_eq!(Command::parse("obj abc"), None);
        assert_eq!(Command::parse("frobnicate"), None);
    }
}
